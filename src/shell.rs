//! The interactive shell: command tree and dispatch.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use scanbridge_argv::{
    tokenize, validate_any, validate_uint16, Command, Invocation, Opt, Parameter,
};
use scanbridge_core::AppConfig;
use scanbridge_discovery::{Client, DiscoveredUnit, DnssdBackend, Mode};
use scanbridge_transport::{parse_addr, parse_url};
use scanbridge_wsd::WsdBackend;
use tokio::runtime::Handle;
use tracing::warn;

/// Context shared by all command handlers.
pub struct ShellContext {
    /// Handle of the async runtime the handlers block on.
    pub runtime: Handle,

    /// The application configuration.
    pub config: AppConfig,
}

/// Outcome of one shell line.
pub enum ExecResult {
    Continue,
    Exit,
}

/// Tokenizes and executes one shell line.
pub fn exec(root: &Command, line: &str) -> Result<ExecResult> {
    let tokens = tokenize(line).map_err(|err| anyhow!("{}", err))?;

    if tokens.is_empty() {
        return Ok(ExecResult::Continue);
    }

    if tokens[0] == "exit" || tokens[0] == "quit" {
        return Ok(ExecResult::Exit);
    }

    root.run(&tokens)?;
    Ok(ExecResult::Continue)
}

/// Builds the root command tree.
pub fn root_command(context: &Arc<ShellContext>) -> Command {
    Command {
        name: "scanbridge".into(),
        help: "printer/scanner discovery and bridge toolkit".into(),
        sub_commands: vec![
            discover_command(context),
            url_command(),
            escl_server_command(context),
            help_command(),
        ],
        ..Command::default()
    }
}

fn discover_command(context: &Arc<ShellContext>) -> Command {
    let context = Arc::clone(context);

    Command {
        name: "discover".into(),
        help: "discover devices on the network".into(),
        options: vec![
            Opt {
                name: "-w".into(),
                aliases: vec!["--wsd".into()],
                help: "WS-Discovery only".into(),
                conflicts: vec!["-d".into(), "--dnssd".into()],
                ..Opt::default()
            },
            Opt {
                name: "-d".into(),
                aliases: vec!["--dnssd".into()],
                help: "DNS-SD only".into(),
                conflicts: vec!["-w".into(), "--wsd".into()],
                ..Opt::default()
            },
        ],
        handler: Some(Arc::new(move |inv: &Invocation| {
            run_discover(&context, inv)
        })),
        ..Command::default()
    }
}

fn run_discover(context: &ShellContext, inv: &Invocation) -> Result<()> {
    let only_wsd = inv.has("-w");
    let only_dnssd = inv.has("-d");
    let config = &context.config.discovery;

    let use_wsd = (config.wsd || only_wsd) && !only_dnssd;
    let use_dnssd = (config.dnssd || only_dnssd) && !only_wsd;

    let devices = context.runtime.block_on(async {
        let client = Client::new();

        if use_wsd {
            match WsdBackend::new() {
                Ok(backend) => {
                    client.add_backend(Arc::new(backend))?;
                }
                Err(err) => warn!(error = %err, "WSD backend unavailable"),
            }
        }

        if use_dnssd {
            match DnssdBackend::new() {
                Ok(backend) => {
                    client.add_backend(Arc::new(backend))?;
                }
                Err(err) => warn!(error = %err, "DNS-SD backend unavailable"),
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(config.wait_ms)).await;
        let devices = client.get_devices(Mode::Snapshot).await;
        client.close().await;

        Ok::<_, anyhow::Error>(devices)
    })?;

    if devices.is_empty() {
        println!("no devices found");
        return Ok(());
    }

    for device in devices {
        print_unit(&device);
    }

    Ok(())
}

fn print_unit(unit: &DiscoveredUnit) {
    let id = unit.id();
    let meta = unit.meta();

    println!("{} ({} {} {})", id.device_name, id.realm, id.svc_proto, id.svc_type);
    if !meta.make_model.is_empty() {
        println!("    model:    {}", meta.make_model);
    }
    if !meta.location.is_empty() {
        println!("    location: {}", meta.location);
    }
    for endpoint in unit.endpoints() {
        println!("    endpoint: {}", endpoint);
    }
}

fn url_command() -> Command {
    Command {
        name: "url".into(),
        help: "parse and canonicalize device URLs".into(),
        sub_commands: vec![
            Command {
                name: "parse".into(),
                help: "canonicalize a URL".into(),
                parameters: vec![Parameter {
                    name: "url".into(),
                    validate: Some(validate_any),
                    ..Parameter::default()
                }],
                handler: Some(Arc::new(|inv: &Invocation| {
                    let raw = inv.get("url").unwrap_or_default();
                    let url = parse_url(raw)?;
                    println!("{}", url);
                    Ok(())
                })),
                ..Command::default()
            },
            Command {
                name: "addr".into(),
                help: "canonicalize a device address".into(),
                parameters: vec![
                    Parameter {
                        name: "addr".into(),
                        validate: Some(validate_any),
                        ..Parameter::default()
                    },
                    Parameter {
                        name: "[template]".into(),
                        validate: Some(validate_any),
                        ..Parameter::default()
                    },
                ],
                handler: Some(Arc::new(|inv: &Invocation| {
                    let addr = inv.get("addr").unwrap_or_default();
                    let template = inv.get("[template]").unwrap_or_default();
                    let url = parse_addr(addr, template)?;
                    println!("{}", url);
                    Ok(())
                })),
                ..Command::default()
            },
        ],
        ..Command::default()
    }
}

fn escl_server_command(context: &Arc<ShellContext>) -> Command {
    let context = Arc::clone(context);

    Command {
        name: "escl-server".into(),
        help: "serve a virtual scanner over eSCL".into(),
        description: "Runs an eSCL scan server over the built-in virtual scanner \
                      until interrupted. With a configured certificate the same \
                      port serves both plaintext and TLS clients."
            .into(),
        options: vec![Opt {
            name: "-p".into(),
            aliases: vec!["--port".into()],
            help: "listen port override".into(),
            validate: Some(validate_uint16),
            ..Opt::default()
        }],
        handler: Some(Arc::new(move |inv: &Invocation| {
            let mut escl = context.config.escl.clone();
            if let Some(port) = inv.get("-p") {
                let host = escl
                    .bind_addr
                    .rsplit_once(':')
                    .map(|(host, _)| host.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string());
                escl.bind_addr = format!("{}:{}", host, port);
            }

            context.runtime.block_on(crate::serve::serve_escl(&escl))
        })),
        ..Command::default()
    }
}

fn help_command() -> Command {
    Command {
        name: "help".into(),
        help: "list available commands".into(),
        handler: Some(Arc::new(|_inv: &Invocation| {
            println!("Commands:");
            println!("  discover [-w|--wsd] [-d|--dnssd]   discover devices");
            println!("  url parse <url>                    canonicalize a URL");
            println!("  url addr <addr> [template]         canonicalize an address");
            println!("  escl-server [-p port]              serve the virtual scanner");
            println!("  help                               this text");
            println!("  exit                               leave the shell");
            Ok(())
        })),
        ..Command::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Arc<ShellContext> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle = runtime.handle().clone();

        // Tests only need the handle for command construction.
        std::mem::forget(runtime);

        Arc::new(ShellContext {
            runtime: handle,
            config: AppConfig::default(),
        })
    }

    #[test]
    fn test_root_command_verifies() {
        let root = root_command(&context());
        assert!(root.verify().is_ok());
    }

    #[test]
    fn test_url_parse_dispatch() {
        let root = root_command(&context());
        let argv: Vec<String> = ["url", "parse", "http://127.0.0.1:80/ipp//print/../print"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert!(root.run(&argv).is_ok());
    }

    #[test]
    fn test_unknown_command_fails() {
        let root = root_command(&context());
        let argv = vec!["frobnicate".to_string()];
        assert!(root.run(&argv).is_err());
    }

    #[test]
    fn test_abbreviated_command() {
        // "u" is unambiguous for "url".
        let root = root_command(&context());
        let argv: Vec<String> = ["u", "parse", "ipp://10.0.0.1:631/ipp/print"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(root.run(&argv).is_ok());
    }

    #[test]
    fn test_exec_exit() {
        let root = root_command(&context());
        assert!(matches!(exec(&root, "exit").unwrap(), ExecResult::Exit));
        assert!(matches!(exec(&root, "").unwrap(), ExecResult::Continue));
    }
}
