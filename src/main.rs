use anyhow::Result;
use fieldproj::problem::Problem;
use fieldproj::settings;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = settings::load_config()?;
    info!("{}", settings);

    let mut problem = Problem::new(settings)?;
    problem.solve()?;
    problem.writeup()?;

    Ok(())
}
