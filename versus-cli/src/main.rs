fn main() -> anyhow::Result<()> {
    versus_cli::run()
}
