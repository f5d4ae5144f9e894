fn main() -> anyhow::Result<()> {
    notes_sync::cli::run()
}
