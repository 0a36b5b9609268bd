use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use todos::cli::{Command::*, CommandLineArgs};
use todos::client::{HttpApi, TodoApp};
use todos::interface;
use todos::model::TodoFilter;
use todos::store::{find_default_store_file, Store};

fn init_logging(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn serve(host: String, port: u16, database: Option<PathBuf>) -> anyhow::Result<()> {
    let ip: IpAddr = host
        .parse()
        .with_context(|| format!("Invalid listen address '{}'.", host))?;
    let database = match database {
        Some(path) => path,
        None => find_default_store_file()?,
    };

    // Without a store there is nothing to serve.
    let store = Store::open(&database)?;
    tracing::info!(database = %database.display(), "todo store ready");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create the async runtime.")?;
    runtime.block_on(todos::api::serve(SocketAddr::new(ip, port), store))
}

fn client(api: &str, timeout: std::time::Duration) -> anyhow::Result<TodoApp<HttpApi>> {
    let http = HttpApi::new(api, timeout).context("Failed to set up the HTTP client.")?;
    Ok(TodoApp::new(http))
}

fn main() -> anyhow::Result<()> {
    // Get the command-line arguments.
    let CommandLineArgs {
        action,
        api,
        timeout,
    } = CommandLineArgs::from_args();

    if matches!(action, Serve { .. }) {
        init_logging("todos=info,tower_http=info");
    } else {
        init_logging("todos=warn");
    }

    // Perform the action.
    let app = match action {
        Serve {
            host,
            port,
            database,
        } => return serve(host, port, database),
        Ping => {
            HttpApi::new(&api, timeout)?
                .ping()
                .with_context(|| format!("The todo API at {} is not reachable.", api))?;
            println!("{} is up.", api);
            return Ok(());
        }
        Shell => {
            let mut app = client(&api, timeout)?;
            let stdin = std::io::stdin();
            return interface::run_shell(&mut app, stdin.lock(), std::io::stdout());
        }
        List {
            status,
            category,
            search,
        } => {
            let http = HttpApi::new(&api, timeout)?;
            let filter = TodoFilter {
                status,
                category,
                search,
            };
            let mut app = TodoApp::with_filter(http, filter);
            app.mount();
            app
        }
        Add {
            words,
            category,
            due,
        } => {
            let mut app = client(&api, timeout)?;
            app.mount();
            app.add(interface::new_todo(words, category, due));
            app
        }
        Toggle { position } => {
            let mut app = client(&api, timeout)?;
            app.mount();
            interface::toggle_at(&mut app, position);
            app
        }
        Rm { position } => {
            let mut app = client(&api, timeout)?;
            app.mount();
            interface::remove_at(&mut app, position);
            app
        }
        Clear => {
            let mut app = client(&api, timeout)?;
            app.clear_completed();
            app
        }
    };

    print!("{}", interface::render(&app));
    if app.error().is_some() {
        std::process::exit(1);
    }
    Ok(())
}
