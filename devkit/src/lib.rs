/*!
# Printer Monitor DevKit - stubs and helpers for tests

Lets a full poll cycle run without printers or a broker:
- Scripted SNMP walker answering per address
- Recording alert sink with failure injection
- Builder for `prtMarkerSuppliesEntry` tables
- Harness wiring config, snapshot file and stubs in a temp dir
*/

pub mod queue_stub;
pub mod snmp_stub;
pub mod supply_fixtures;
pub mod test_utils;

pub use queue_stub::MockAlertSink;
pub use snmp_stub::ScriptedWalker;
pub use supply_fixtures::SupplyTableBuilder;
pub use test_utils::TestHarness;
