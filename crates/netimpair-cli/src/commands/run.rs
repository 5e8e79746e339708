//! Wiring for the `run` subcommand: validate arguments, build the core, spawn
//! the chosen adapter, optionally serve the HTTP control surface, and block
//! until Ctrl-C.

use crate::adapters::{kernel_queue, udp_proxy};
use crate::{Level, RunArgs, Transport};
use netimpair_core::parameters::{ParameterStore, Parameters};
use netimpair_core::pipe_pair::PipePair;
use netimpair_core::scheduler::{LiveScheduler, Scheduler};
use netimpair_core::CoreHandle;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    if args.level == Level::User && args.transport == Transport::Tcp {
        anyhow::bail!("user-level impairment only supports --transport udp (TCP needs kernel-level interception)");
    }
    if args.level == Level::User && args.proxy_port.is_none() {
        anyhow::bail!("--proxy-port is required at --level user");
    }

    let initial = validate_initial_parameters(&args)?;
    let params = Arc::new(ParameterStore::new(initial));

    let scheduler = LiveScheduler::new();
    let dyn_scheduler: Arc<dyn Scheduler> = scheduler.clone();
    let pipes = Arc::new(PipePair::new(params, Arc::clone(&dyn_scheduler), None));
    let handle = Arc::new(CoreHandle::new(Arc::clone(&pipes)));

    if let Some(control_port) = args.control_port {
        let server_handle = Arc::clone(&handle);
        std::thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().expect("failed to start control surface runtime");
            if let Err(e) = rt.block_on(netimpair_server::run_server(server_handle, "0.0.0.0", control_port)) {
                log::error!("control surface stopped: {e}");
            }
        });
        log::info!("control surface listening on http://0.0.0.0:{control_port}");
    }

    spawn_adapter(&args, Arc::clone(&pipes), Arc::clone(&dyn_scheduler))?;

    log::info!(
        "netimpair running: transport={:?} level={:?} port={} (Ctrl-C to stop)",
        args.transport,
        args.level,
        args.port
    );

    let running = Arc::new(AtomicBool::new(true));
    let handler_running = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("shutting down");
        handler_running.store(false, Ordering::SeqCst);
    })?;
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    scheduler.stop();
    Ok(())
}

/// Validates the CLI's initial parameter set through the same gate a live
/// `PUT /pipes` goes through, so a bad `--loss`/`--delay` at startup fails
/// the same way a bad runtime update would.
fn validate_initial_parameters(args: &RunArgs) -> anyhow::Result<Parameters> {
    let staging = ParameterStore::new(Parameters::default());
    let mut candidate: HashMap<String, Value> = HashMap::new();
    candidate.insert("bandwidth".to_string(), Value::from(args.bandwidth));
    candidate.insert("buffer".to_string(), Value::from(args.buffer));
    candidate.insert("delay".to_string(), Value::from(args.delay));
    candidate.insert("loss".to_string(), Value::from(args.loss));
    Ok(staging.update(&candidate)?)
}

fn spawn_adapter(
    args: &RunArgs,
    pipes: Arc<PipePair>,
    scheduler: Arc<dyn Scheduler>,
) -> anyhow::Result<()> {
    use netimpair_core::adapter::PacketSource;

    match args.level {
        Level::User => {
            let proxy_port = args.proxy_port.expect("validated above");
            let adapter = Box::new(udp_proxy::UdpProxyAdapter::new(args.port, proxy_port));
            std::thread::spawn(move || {
                if let Err(e) = adapter.run(pipes, scheduler) {
                    log::error!("udp-proxy adapter failed: {e}");
                }
            });
        }
        Level::Kernel => {
            let interface = kernel_queue::resolve_interface(&args.interface)?;
            let transport = match args.transport {
                Transport::Tcp => "tcp",
                Transport::Udp => "udp",
            };
            let adapter = Box::new(kernel_queue::KernelQueueAdapter::new(
                transport,
                args.port,
                interface,
                args.direction,
                args.ip_version,
            ));
            std::thread::spawn(move || {
                if let Err(e) = adapter.run(pipes, scheduler) {
                    log::error!("nfqueue adapter failed: {e}");
                }
            });
        }
    }
    Ok(())
}
