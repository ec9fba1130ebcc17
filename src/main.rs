// src/main.rs

use bollettino_host::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        // Exit explicitly: the stdin reader may still be parked on a read.
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("bollettino-host error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
