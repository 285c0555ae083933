//! entrypoint - Container entrypoint
//!
//! Starts the probe proxy in the background, then launches and supervises the
//! selected application. The application's exit code becomes ours; the proxy
//! goes away with the process.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, ValueEnum};
use std::path::PathBuf;

use entrypoint::config::DEFAULT_LISTEN_PORT;
use entrypoint::{run_child_process, App, ProbeProxy, ProxyConfig};

#[derive(Parser)]
#[command(name = "entrypoint")]
#[command(about = "Container entrypoint: supervises an application and proxies its health probes")]
struct Args {
    /// Directory to run the application in (defaults per application)
    #[arg(long, value_name = "PATH")]
    working_dir: Option<PathBuf>,

    /// Port for the probe proxy
    #[arg(long, default_value_t = DEFAULT_LISTEN_PORT)]
    probe_proxy_port: u16,

    /// Base URL of the application's own probe server
    #[arg(long, value_name = "URL")]
    probe_target_url: Option<String>,

    /// Don't start the probe proxy
    #[arg(long)]
    no_probe_proxy: bool,

    /// Application to run (gameserver, botclient or dotnet), then its arguments
    ///
    /// Everything after the application name goes to the application verbatim,
    /// including arguments that look like entrypoint options.
    #[arg(
        value_name = "APP",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

impl Args {
    /// Selected application, or a usage error
    fn app(&self) -> Result<App, clap::Error> {
        let name = self.command.first().map(String::as_str).unwrap_or_default();
        App::from_str(name, false).map_err(|_| {
            let possible: Vec<&str> = App::value_variants().iter().map(App::name).collect();
            Args::command().error(
                ErrorKind::InvalidValue,
                format!(
                    "invalid application '{}' [possible values: {}]",
                    name,
                    possible.join(", ")
                ),
            )
        })
    }

    fn child_args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }

    fn proxy_config(&self) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.listen_addr.set_port(self.probe_proxy_port);
        if let Some(url) = &self.probe_target_url {
            config.target_base_url = url.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() {
    // Usage errors exit with status 2
    let args = Args::parse();
    let app = args.app().unwrap_or_else(|e| e.exit());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if !args.no_probe_proxy {
        match ProbeProxy::new(args.proxy_config()) {
            Ok(proxy) => {
                tokio::spawn(async move {
                    if let Err(e) = proxy.run().await {
                        log::error!("{}", e);
                    }
                });
            }
            Err(e) => log::error!("Probe proxy disabled: {}", e),
        }
    }

    let working_dir = args
        .working_dir
        .clone()
        .unwrap_or_else(|| app.default_working_dir().to_path_buf());

    log::info!("Starting {} in {}", app, working_dir.display());

    let code = match run_child_process(&working_dir, app.binary(), args.child_args()).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}
