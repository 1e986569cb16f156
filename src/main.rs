// hostpack command line entry point

use anyhow::Context;
use hostpack::cli::CliHandler;
use hostpack::HostpackError;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        match e.downcast_ref::<HostpackError>() {
            Some(err) => eprintln!("{}", err.format_detailed()),
            None => eprintln!("❌ Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    CliHandler::new().run().await.context("hostpack command failed")
}
