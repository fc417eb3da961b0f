// send_request - manual smoke-test harness for one Access-Request
//
// Not a product CLI: a small clap binary for exercising the library by hand
// against a real RADIUS server while developing or debugging.

use clap::Parser;
use radius_client::{avp::Avp, client, ClientConfig, RadiusError, RequestBundle, RequestKind, UdpTransport};

#[derive(Parser)]
#[command(about = "Send a single RADIUS Access-Request and print the outcome")]
struct Args {
    /// Path to a TOML config file containing the `[servers.<name>]` table
    #[arg(long)]
    config: String,

    /// Server name as it appears in the config's server table
    #[arg(long)]
    server: String,

    #[arg(long)]
    username: String,

    #[arg(long)]
    password: String,

    #[arg(long, default_value_t = 0)]
    id: u8,
}

fn main() -> std::result::Result<(), RadiusError> {
    init_tracing();

    let args = Args::parse();
    let config = ClientConfig::from_file(&args.config)?;

    let avps = vec![
        Avp::user_name(args.username),
        Avp::user_password(args.password),
        Avp::nas_port(0),
    ];

    let mut bundle = RequestBundle::new(args.server, args.id, avps);
    let mut transport = UdpTransport::new();
    let mut message = String::new();

    match client::send_server(
        &mut bundle,
        &config,
        &mut transport,
        None,
        Some(&mut message),
        RequestKind::Auth,
    ) {
        Ok(status) => {
            println!("status: {:?}", status);
            if !message.is_empty() {
                print!("{}", message);
            }
        }
        Err(e) => {
            eprintln!("transaction failed: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn init_tracing() {
    let _ = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(tracing::Level::INFO)
            .finish(),
    );
}
