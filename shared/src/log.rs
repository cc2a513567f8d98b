use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{format, time::ChronoLocal},
    EnvFilter,
};

/// Install the global subscriber. A set `RUST_LOG` wins outright; otherwise
/// `directive` raises the binary's own crate (e.g. `server=debug`) and
/// everything else logs at `info`.
pub fn init_log(directive: &str) {
    let format = format::format()
        .with_level(true)
        .with_target(false)
        .with_timer(ChronoLocal::new("[%m-%d %H:%M:%S%.3f]".to_string()))
        .compact();

    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = build_filter(directive, env.as_deref());
    tracing_subscriber::fmt().with_env_filter(env_filter).event_format(format).init();
}

fn build_filter(directive: &str, env: Option<&str>) -> EnvFilter {
    if let Some(env) = env.filter(|env| !env.trim().is_empty()) {
        match EnvFilter::try_new(env) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("ignoring {}=`{env}`: {err}", EnvFilter::DEFAULT_ENV),
        }
    }
    EnvFilter::try_new(format!("{directive},info")).unwrap_or_else(|err| {
        eprintln!("ignoring log directive `{directive}`: {err}");
        EnvFilter::default().add_directive(LevelFilter::INFO.into())
    })
}
