use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Ping,
    Tables,
    Await,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help(HelpTopic),
    Ping,
    Tables,
    Await(AwaitArgs),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwaitArgs {
    pub tag: Uuid,
    /// `None` falls back to the client's await policy.
    pub timeout: Option<Duration>,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1);
    let Some(first) = it.next() else {
        return Ok(Command::Help(HelpTopic::Root));
    };

    match first.as_str() {
        "-h" | "--help" => Ok(Command::Help(HelpTopic::Root)),
        "ping" => parse_bare(it.map(|s| s.as_str()), Command::Ping, HelpTopic::Ping),
        "tables" => parse_bare(it.map(|s| s.as_str()), Command::Tables, HelpTopic::Tables),
        "await" => parse_await(it.map(|s| s.as_str())),
        _ => anyhow::bail!("unknown command: {first}"),
    }
}

fn parse_bare<'a>(
    mut it: impl Iterator<Item = &'a str>,
    cmd: Command,
    topic: HelpTopic,
) -> anyhow::Result<Command> {
    match it.next() {
        None => Ok(cmd),
        Some("-h" | "--help") => Ok(Command::Help(topic)),
        Some(other) => anyhow::bail!("unexpected argument: {other}"),
    }
}

fn parse_timeout(v: &str) -> anyhow::Result<Duration> {
    let secs: u64 = v
        .parse()
        .map_err(|_| anyhow::anyhow!("--timeout expects whole seconds, got `{v}`"))?;
    Ok(Duration::from_secs(secs))
}

fn parse_await<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut tag: Option<Uuid> = None;
    let mut timeout: Option<Duration> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Await)),
            "--timeout" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--timeout requires a value");
                };
                timeout = Some(parse_timeout(v)?);
            }
            _ if token.starts_with("--timeout=") => {
                timeout = Some(parse_timeout(token.trim_start_matches("--timeout="))?);
            }
            _ if token.starts_with('-') => anyhow::bail!("unknown option: {token}"),
            _ if tag.is_none() => {
                let parsed = Uuid::parse_str(token)
                    .map_err(|e| anyhow::anyhow!("invalid mutation tag `{token}`: {e}"))?;
                tag = Some(parsed);
            }
            _ => anyhow::bail!("unexpected argument: {token}"),
        }
    }

    let Some(tag) = tag else {
        anyhow::bail!("await requires a mutation tag");
    };
    Ok(Command::Await(AwaitArgs { tag, timeout }))
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => {
            println!(
                "\
chorm - ClickHouse connectivity and mutation checks

USAGE:
  chorm <COMMAND> [OPTIONS]

COMMANDS:
  ping          Check that the server answers
  tables        List tables in the configured database
  await         Wait for a tagged mutation to finish

Connection settings are read from CLICKHOUSE_HOST, CLICKHOUSE_PORT,
CLICKHOUSE_USERNAME, CLICKHOUSE_PASSWORD and CLICKHOUSE_DATABASE
(a `.env` file in the working directory is honoured).

Run `chorm <command> --help` for more."
            );
        }
        HelpTopic::Ping => {
            println!(
                "\
USAGE:
  chorm ping

Exit non-zero if the server does not answer."
            );
        }
        HelpTopic::Tables => {
            println!(
                "\
USAGE:
  chorm tables

Print one table name per line."
            );
        }
        HelpTopic::Await => {
            println!(
                "\
USAGE:
  chorm await <TAG> [OPTIONS]

ARGS:
  <TAG>                 UUID embedded in the mutation's WHERE clause

OPTIONS:
  --timeout <SECS>      Give up after SECS seconds (default: 600)
  -h, --help            Print help"
            );
        }
    }
}
