#[tokio::main]
async fn main() -> anyhow::Result<()> {
    password_recovery::cli::run_with_sys_args().await
}
