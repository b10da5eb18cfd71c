mod cli;
mod demo_peer;

use clap::Parser;

use bolt_runner::{Job, Runner, RunnerConfig};

use crate::cli::Cli;
use crate::demo_peer::{DemoArgs, DemoPeerClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    tracing::info!(job = %cli.job_name, num_tries = cli.num_tries, "starting demo run");
    println!("bolt {} job={}", env!("CARGO_PKG_VERSION"), cli.job_name);

    let publisher = DemoPeerClient::new(2);
    let partner = DemoPeerClient::new(2);
    let config = RunnerConfig {
        default_num_tries: cli.num_tries,
        poll_interval: cli.poll_interval(),
    };
    let runner = Runner::new(publisher, partner, config);

    let mut job = Job::new(
        cli.job_name.clone(),
        DemoArgs {
            label: format!("{}-publisher", cli.job_name),
        },
        DemoArgs {
            label: format!("{}-partner", cli.job_name),
        },
    );
    job.final_stage = cli.final_stage.clone();

    let summary = runner.run_job(job).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !summary.is_success {
        std::process::exit(1);
    }
    Ok(())
}
