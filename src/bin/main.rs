use clap::{ArgGroup, Parser};
use simpleperf::{parse_sized, Client, Config, Server, SizeUnit};
use std::net::IpAddr;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "simpleperf")]
#[command(about = "A simple TCP throughput measurement tool", long_about = None)]
#[command(version)]
#[command(group(ArgGroup::new("role").required(true).args(["server", "client"])))]
struct Cli {
    /// Run in server mode
    #[arg(short, long)]
    server: bool,

    /// Run in client mode
    #[arg(short, long)]
    client: bool,

    /// IP address of the server's interface to bind to
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port the server listens on / the client connects to
    #[arg(short, long, default_value_t = 8088)]
    port: u16,

    /// Unit for reported transfer sizes: B, KB or MB
    #[arg(short, long, default_value = "MB")]
    format: SizeUnit,

    /// Server IP address (client mode)
    #[arg(short = 'I', long, default_value = "127.0.0.1")]
    server_ip: String,

    /// Total duration in seconds for which data is generated
    #[arg(short, long, visible_alias = "total-time", default_value_t = 25)]
    time: u64,

    /// Print statistics every N seconds; 0 reports a single window without a total
    #[arg(short, long, default_value_t = 1)]
    interval: u64,

    /// Number of parallel connections (1-5)
    #[arg(short = 'P', long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=5))]
    parallel: u8,

    /// Number of bytes to send, e.g. 500KB or 10MB (overrides --time)
    #[arg(short, long)]
    num: Option<String>,

    /// Send BYE after the last chunk and wait for the server's acknowledgment
    #[arg(long)]
    bye: bool,

    /// Per-operation socket timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Output in JSON format
    #[arg(short = 'J', long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let io_timeout = cli.timeout.map(Duration::from_secs);

    if cli.server {
        let config = Config::server(cli.port)
            .with_bind_addr(cli.bind)
            .with_format(cli.format)
            .with_io_timeout(io_timeout)
            .with_json(cli.json);
        config.validate()?;

        let server = Server::new(config);
        server.run().await?;
        return Ok(());
    }

    // Size tokens are checked before any connection is attempted.
    let num_bytes = cli.num.as_deref().map(parse_sized).transpose()?;
    let interval = (cli.interval > 0).then(|| Duration::from_secs(cli.interval));

    let config = Config::client(cli.server_ip, cli.port)
        .with_format(cli.format)
        .with_duration(Duration::from_secs(cli.time))
        .with_interval(interval)
        .with_parallel(cli.parallel as usize)
        .with_num_bytes(num_bytes)
        .with_sentinel(cli.bye)
        .with_io_timeout(io_timeout)
        .with_json(cli.json);

    let client = Client::new(config)?;
    let results = client.run().await;

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed == results.len() {
        anyhow::bail!("all {} stream(s) failed", failed);
    }

    Ok(())
}
