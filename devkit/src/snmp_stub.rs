/*!
Scripted SNMP walker.

Each address gets a standing answer and optionally a queue of one-shot
answers consumed first. Addresses with no script time out.
*/

use printer_monitor::snmp::{ProtocolError, SnmpWalk, VarBind};
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::Mutex;

type WalkResult = Result<Vec<VarBind>, ProtocolError>;

#[derive(Default)]
struct Script {
    once: VecDeque<WalkResult>,
    standing: Option<WalkResult>,
}

#[derive(Default)]
pub struct ScriptedWalker {
    scripts: Mutex<HashMap<Ipv4Addr, Script>>,
    calls: Mutex<Vec<Ipv4Addr>>,
}

impl ScriptedWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every walk of `address` with `bindings` until told otherwise.
    pub fn respond(&self, address: Ipv4Addr, bindings: Vec<VarBind>) {
        self.scripts.lock().unwrap().entry(address).or_default().standing = Some(Ok(bindings));
    }

    /// Answer only the next walk of `address`.
    pub fn respond_once(&self, address: Ipv4Addr, bindings: Vec<VarBind>) {
        self.scripts.lock().unwrap().entry(address).or_default().once.push_back(Ok(bindings));
    }

    pub fn fail(&self, address: Ipv4Addr, error: ProtocolError) {
        self.scripts.lock().unwrap().entry(address).or_default().standing = Some(Err(error));
    }

    /// Addresses walked so far, in call order.
    pub fn calls(&self) -> Vec<Ipv4Addr> {
        self.calls.lock().unwrap().clone()
    }
}

impl SnmpWalk for ScriptedWalker {
    fn walk(&self, address: Ipv4Addr, _oid_prefix: &[u32]) -> WalkResult {
        self.calls.lock().unwrap().push(address);

        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(&address) else {
            return Err(ProtocolError::transport(format!("requestTimedOut: no response from {address}")));
        };
        if let Some(answer) = script.once.pop_front() {
            return answer;
        }
        script
            .standing
            .clone()
            .unwrap_or_else(|| Err(ProtocolError::transport(format!("requestTimedOut: no response from {address}"))))
    }
}
