use tilesplat_cli::Cli;

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Stdout)
        .init();

    let cli = Cli::load()?.validate()?;
    tilesplat_cli::run(&cli)
}
