use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    ask::logging::init();

    match ask::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ask::exit_code_for(&err)
        }
    }
}
