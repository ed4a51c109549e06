//! 命令行注册
//! Command-line registry

use clap::{Arg, Command};

/// 构建命令行应用
/// Build the command-line application
pub fn build_app() -> Command {
    Command::new("vfood-rust")
        .version(env!("CARGO_PKG_VERSION"))
        .about("多租户餐饮门店订单后端 / Multi-tenant food-outlet ordering backend")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("server")
                .about("启动HTTP服务与实时监听 / Start the HTTP server and realtime listener")
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("HOST")
                        .help("覆盖监听主机 / Override the listen host"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .value_parser(clap::value_parser!(u16))
                        .help("覆盖监听端口 / Override the listen port"),
                )
                .arg(
                    Arg::new("workers")
                        .short('w')
                        .long("workers")
                        .value_name("WORKERS")
                        .value_parser(clap::value_parser!(usize))
                        .help("覆盖工作线程数 / Override the worker count"),
                ),
        )
        .subcommand(Command::new("version").about("显示版本信息 / Print version information"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_overrides_parse() {
        let matches = build_app()
            .try_get_matches_from(["vfood-rust", "server", "--port", "8080", "-w", "4"])
            .unwrap();
        let ("server", sub) = matches.subcommand().unwrap() else {
            panic!("expected server subcommand")
        };
        assert_eq!(sub.get_one::<u16>("port"), Some(&8080));
        assert_eq!(sub.get_one::<usize>("workers"), Some(&4));
        assert_eq!(sub.get_one::<String>("host"), None);
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(build_app().try_get_matches_from(["vfood-rust"]).is_err());
    }
}
