use std::error::Error;

use clap::ArgMatches;

use vfood_rust::bootstrap::{build_app, init_tracing, AppBootstrap};
use vfood_rust::conf::AppConfig;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let matches: ArgMatches = build_app().get_matches();

    match matches.subcommand() {
        Some(("server", sub_matches)) => {
            handle_server_command(sub_matches).await?;
        }
        Some(("version", _)) => {
            println!("vfood-rust {}", env!("CARGO_PKG_VERSION"));
        }
        _ => {
            // subcommand_required(true) 使这里不可达
            // subcommand_required(true) makes this unreachable
            eprintln!("未知命令，请使用 --help 查看可用命令");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn handle_server_command(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    init_tracing();

    let mut config = AppConfig::load()?;

    // 命令行覆盖配置文件 / Command line overrides the config files
    if let Some(host) = matches.get_one::<String>("host") {
        config.server.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.server.workers = Some(*workers);
    }

    AppBootstrap::new(config).run().await?;
    Ok(())
}
