mod cli;

use anyhow::Context;
use chorm::{ClickHouseClient, ClickHouseConfig, HttpConnector, HttpTransport};

fn connect() -> anyhow::Result<ClickHouseClient<HttpTransport>> {
    dotenvy::dotenv().ok();
    let config = ClickHouseConfig::from_env().context("load ClickHouse config from environment")?;
    Ok(ClickHouseClient::new(config, HttpConnector))
}

pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let cmd = cli::parse_args(&args)?;
    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Ping => {
            let client = connect()?;
            if !client.ping().await.context("ping ClickHouse")? {
                anyhow::bail!("ClickHouse did not answer the ping");
            }
            println!("Ok.");
            Ok(())
        }
        cli::Command::Tables => {
            let client = connect()?;
            for table in client.show_tables().await.context("list tables")? {
                println!("{table}");
            }
            Ok(())
        }
        cli::Command::Await(args) => {
            let client = connect()?;
            let done = client
                .track(args.tag)
                .await_done(args.timeout)
                .await
                .with_context(|| format!("await mutation {}", args.tag))?;
            if !done {
                anyhow::bail!("mutation {} still pending after timeout", args.tag);
            }
            println!("mutation {} done", args.tag);
            Ok(())
        }
    }
}
