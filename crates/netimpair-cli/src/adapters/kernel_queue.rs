//! Kernel NFQUEUE packet interceptor: binds an NFQUEUE socket and installs
//! `iptables` INPUT/OUTPUT rules that redirect traffic on the configured
//! port into it.

use crate::Direction as RuleDirection;
use crate::IpVersion;
use netimpair_core::adapter::PacketSource;
use netimpair_core::error::Error;
use netimpair_core::pipe_pair::PipePair;
use netimpair_core::scheduler::Scheduler;
use nfq::{Queue, Verdict};
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

const QUEUE_NUM: u16 = 1;
const RULE_COMMENT_PREFIX: &str = "netimpair";

pub struct KernelQueueAdapter {
    transport: &'static str,
    port: u16,
    interface: String,
    direction: RuleDirection,
    ip_version: IpVersion,
}

impl KernelQueueAdapter {
    pub fn new(
        transport: &'static str,
        port: u16,
        interface: String,
        direction: RuleDirection,
        ip_version: IpVersion,
    ) -> Self {
        Self { transport, port, interface, direction, ip_version }
    }
}

/// The `iptables`-family binaries to drive for a given `--ip-version`.
fn iptables_binaries(ip_version: IpVersion) -> &'static [&'static str] {
    match ip_version {
        IpVersion::V4 => &["iptables"],
        IpVersion::V6 => &["ip6tables"],
        IpVersion::Both => &["iptables", "ip6tables"],
    }
}

impl PacketSource for KernelQueueAdapter {
    fn name(&self) -> &'static str {
        "nfqueue"
    }

    fn run(self: Box<Self>, pipes: Arc<PipePair>, _scheduler: Arc<dyn Scheduler>) -> Result<(), Error> {
        install_rules(self.transport, self.port, &self.interface, self.direction, self.ip_version)
            .map_err(Error::FatalEnvironment)?;

        let mut raw = Queue::open().map_err(|e| Error::FatalEnvironment(format!("failed to open NFQUEUE: {e}")))?;
        raw.bind(QUEUE_NUM)
            .map_err(|e| Error::FatalEnvironment(format!("failed to bind queue {QUEUE_NUM}: {e}")))?;
        // Shared so deliver/drop verdicts (fired later, from the scheduler)
        // can post back on the same netlink socket `recv` reads from. A
        // verdict posted while this loop is blocked in `recv` waits for the
        // next packet to arrive before the lock is free — a real limitation
        // of sharing one fd this way, not fixed here (see DESIGN.md).
        let queue = Arc::new(Mutex::new(raw));

        loop {
            let msg = {
                let mut guard = queue.lock().unwrap();
                match guard.recv() {
                    Ok(msg) => msg,
                    Err(e) => {
                        log::warn!("nfqueue: recv failed: {e}");
                        continue;
                    }
                }
            };

            let size = msg.get_payload().len() as u64;
            // python-netfilterqueue doesn't handle multiple queues correctly,
            // so direction is determined from the destination port as packets
            // arrive (IPv6 and IPv4 options are not handled).
            let direction = if destination_port(msg.get_payload()) == Some(self.port) {
                netimpair_core::Direction::Up
            } else {
                netimpair_core::Direction::Down
            };

            let slot = Arc::new(Mutex::new(Some(msg)));
            let deliver_slot = Arc::clone(&slot);
            let deliver_queue = Arc::clone(&queue);
            let drop_slot = Arc::clone(&slot);
            let drop_queue = Arc::clone(&queue);

            pipes.pipe(direction).attempt(
                Box::new(move || {
                    if let Some(mut msg) = deliver_slot.lock().unwrap().take() {
                        msg.set_verdict(Verdict::Accept);
                        if let Err(e) = deliver_queue.lock().unwrap().verdict(msg) {
                            log::warn!("nfqueue: failed posting accept verdict: {e}");
                        }
                    }
                }),
                Box::new(move || {
                    if let Some(mut msg) = drop_slot.lock().unwrap().take() {
                        msg.set_verdict(Verdict::Drop);
                        if let Err(e) = drop_queue.lock().unwrap().verdict(msg) {
                            log::warn!("nfqueue: failed posting drop verdict: {e}");
                        }
                    }
                }),
                size,
            );
        }
    }
}

fn destination_port(payload: &[u8]) -> Option<u16> {
    if payload.len() < 24 {
        return None;
    }
    Some(u16::from_be_bytes([payload[22], payload[23]]))
}

fn install_rules(
    transport: &str,
    port: u16,
    interface: &str,
    direction: RuleDirection,
    ip_version: IpVersion,
) -> Result<(), String> {
    let binaries = iptables_binaries(ip_version);
    remove_rules(binaries);
    let comment = format!("{RULE_COMMENT_PREFIX}-pid-{}", std::process::id());

    let targets: &[(&str, &str, &str)] = match direction {
        RuleDirection::Inbound => &[("INPUT", "--in-interface", "--dport")],
        RuleDirection::Outbound => &[("OUTPUT", "--out-interface", "--sport")],
        RuleDirection::Both => &[("INPUT", "--in-interface", "--dport"), ("OUTPUT", "--out-interface", "--sport")],
    };

    for binary in binaries {
        for (chain, iface_flag, port_flag) in targets {
            let status = Command::new(binary)
                .args([
                    "-I",
                    chain,
                    "-p",
                    transport,
                    iface_flag,
                    interface,
                    port_flag,
                    &port.to_string(),
                    "-m",
                    "comment",
                    "--comment",
                    &comment,
                    "-j",
                    "NFQUEUE",
                    "--queue-num",
                    &QUEUE_NUM.to_string(),
                ])
                .status()
                .map_err(|e| format!("failed to run {binary}: {e}"))?;
            if !status.success() {
                return Err(format!("{binary} rule install for {chain} failed: {status}"));
            }
        }
    }
    Ok(())
}

/// Removes any INPUT/OUTPUT rules left over from a previous run of this
/// adapter (matched by our comment prefix), by scanning each chain's rules
/// for the marker before reinstalling.
fn remove_rules(binaries: &[&str]) {
    for binary in binaries {
        for chain in ["INPUT", "OUTPUT"] {
            let Ok(output) = Command::new(binary).args(["-S", chain]).output() else {
                continue;
            };
            let text = String::from_utf8_lossy(&output.stdout);
            for line in text.lines() {
                if !line.contains(RULE_COMMENT_PREFIX) {
                    continue;
                }
                let delete_line = line.replacen("-A", "-D", 1);
                let args: Vec<&str> = delete_line.split_whitespace().collect();
                let _ = Command::new(binary).args(&args).status();
            }
        }
    }
}

/// Resolve `"auto"` to the default outward-facing interface, or validate that
/// a named interface exists.
pub fn resolve_interface(interface: &str) -> Result<String, Error> {
    if interface == "auto" {
        return default_route_interface();
    }
    if !Path::new("/sys/class/net").join(interface).exists() {
        return Err(Error::FatalEnvironment(format!("interface {interface} does not exist")));
    }
    Ok(interface.to_string())
}

fn default_route_interface() -> Result<String, Error> {
    let table = std::fs::read_to_string("/proc/net/route")
        .map_err(|e| Error::FatalEnvironment(format!("failed to read /proc/net/route: {e}")))?;
    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields[1] == "00000000" {
            return Ok(fields[0].to_string());
        }
    }
    Err(Error::FatalEnvironment("no default route found; pass --interface explicitly".to_string()))
}
