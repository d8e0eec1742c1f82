use clap::Parser;
use shellvault::cli::{commands, output, Cli, Commands};

/// Environment variable carrying the log filter (e.g. `debug`, `shellvault=trace`).
const LOG_ENV: &str = "SHELLVAULT_LOG";

fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(&cli),
        Commands::Login => commands::login::execute(&cli),
        Commands::Logout => commands::logout::execute(&cli),
        Commands::Put {
            ref name,
            ref value,
        } => commands::put::execute(&cli, name, value.as_deref()),
        Commands::Get { ref name } => commands::get::execute(&cli, name),
        Commands::List => commands::list::execute(&cli),
        Commands::Delete { ref name, force } => commands::delete::execute(&cli, name, force),
        Commands::Id {
            ref source,
            length,
        } => commands::id::execute(&cli, source, length),
        Commands::Completions { shell } => commands::completions::execute(shell),
    };

    if let Err(e) = result {
        output::error(&e.to_string());
        std::process::exit(1);
    }
}
