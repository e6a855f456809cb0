#[tokio::main]
async fn main() {
    if let Err(e) = zeno_backend::run().await {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }
}
