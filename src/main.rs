fn main() -> anyhow::Result<()> {
    kintai_tui::cli::run()
}
