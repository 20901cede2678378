//! # signer CLI
//!
//! Command-line interface for the signing pipeline.
//!
//! ## Usage
//! ```bash
//! signer sign 0 1 1 2 3 5 8
//! signer sign 4 2 --digest-delay-ms 10 --output json
//! ```

mod cli;

use pipeline_signer::Result;

fn main() -> Result<()> {
    pipeline_signer::init_tracing();
    cli::run()
}
