use std::collections::BTreeSet;
use std::sync::Arc;

use aero_routing::{
    annotate, find_mappings, memory_map, probe, AccessError, AccessMask, AddressSpace,
    DefaultTarget, LocateOptions, MapEntry, MemoryMapOptions, ObjectId, PathEnd, ProbeOptions,
    Register, StaticRegistry, TargetRef, TraceContext, Translation, Translator,
};

const RAM_SIZE: u64 = 0x8000_0000;
const HPET_BASE: u64 = 0xFED0_0000;
const ECAM_BASE: u64 = 0xB000_0000;

/// PCI host bridge: forwards its window to the device BARs it knows about.
struct PciHost {
    bars: Vec<(u64, u64, &'static str)>,
}

impl Translator for PciHost {
    fn translate(
        &self,
        address: u64,
        _access: AccessMask,
        _inquiry: bool,
    ) -> Result<Option<Translation>, AccessError> {
        for &(base, len, dev) in &self.bars {
            if address >= base && address - base < len {
                return Ok(Some(
                    Translation::new(dev, address - base).valid_len(base + len - address),
                ));
            }
        }
        Ok(None)
    }

    fn unmapped_len(&self, address: u64, _access: AccessMask) -> Option<u64> {
        self.bars
            .iter()
            .filter(|&&(base, _, _)| base > address)
            .map(|&(base, _, _)| base - address)
            .min()
    }
}

fn pc() -> StaticRegistry {
    let mut reg = StaticRegistry::new();
    reg.add_space(
        "phys_mem",
        AddressSpace::memory()
            .with_entry(MapEntry::new(0, RAM_SIZE, "ram"))
            .with_entry(MapEntry::new(ECAM_BASE, 0x1000_0000, "pci_host"))
            .with_entry(MapEntry::new(HPET_BASE, 0x400, "hpet").priority(-1))
            .with_default(DefaultTarget::new("open_bus")),
    )
    .unwrap();
    reg.add_space(
        "io",
        AddressSpace::port()
            .with_entry(MapEntry::new(0x3F8, 4, TargetRef::with_port("com1", "regs")))
            .with_entry(MapEntry::new(0x3FC, 4, TargetRef::with_port("com1", "regs")).offset(4)),
    )
    .unwrap();
    reg.add_translator(
        "pci_host",
        Arc::new(PciHost {
            bars: vec![(0x0010_0000, 0x4000, "nvme")],
        }),
    )
    .unwrap();
    for (dev, class) in [
        ("ram", "ram"),
        ("hpet", "hpet"),
        ("nvme", "nvme"),
        ("com1", "uart"),
        ("open_bus", "open-bus"),
    ] {
        reg.add_device(dev, class).unwrap();
    }
    reg.add_bank(
        "com1",
        "regs",
        vec![
            Register::new("thr", 0, 1),
            Register::new("ier", 1, 1),
            Register::new("iir", 2, 1),
            Register::new("lcr", 3, 1),
            Register::new("mcr", 4, 1),
            Register::new("lsr", 5, 1),
        ],
    )
    .unwrap();
    reg.add_processor("cpu0", vec![ObjectId::new("phys_mem"), ObjectId::new("io")])
        .unwrap();
    reg
}

#[test]
fn probe_through_the_pci_host() {
    let reg = pc();
    let path = probe(
        &reg,
        &TargetRef::new("phys_mem"),
        ECAM_BASE + 0x0010_0040,
        &ProbeOptions::default(),
        &mut TraceContext::default(),
    )
    .unwrap();

    assert_eq!(path.end, PathEnd::Terminus);
    assert_eq!(path.terminus(), Some(&TargetRef::new("nvme")));
    assert_eq!(path.hops[0].local_address, 0x0010_0040);
    assert_eq!(path.hops[1].local_address, 0x40);
}

#[test]
fn ram_mmio_and_open_bus_by_address() {
    let reg = pc();
    let mut trace = TraceContext::default();
    let at = |trace: &mut TraceContext, addr| {
        probe(
            &reg,
            &TargetRef::new("phys_mem"),
            addr,
            &ProbeOptions::default(),
            trace,
        )
        .unwrap()
        .terminus()
        .cloned()
    };

    assert_eq!(at(&mut trace, 0x1000), Some(TargetRef::new("ram")));
    assert_eq!(at(&mut trace, HPET_BASE + 8), Some(TargetRef::new("hpet")));
    assert_eq!(at(&mut trace, 0xFFFF_0000), Some(TargetRef::new("open_bus")));
}

#[test]
fn map_around_a_pci_bar() {
    let reg = pc();
    let bar = ECAM_BASE + 0x0010_0000;
    let options = MemoryMapOptions {
        start: bar - 0x10,
        end: bar + 0x4010,
        ..MemoryMapOptions::default()
    };
    let out = memory_map(
        &reg,
        &TargetRef::new("phys_mem"),
        &options,
        &mut TraceContext::default(),
    )
    .unwrap();

    assert_eq!(out.regions.len(), 3);
    assert_eq!((out.regions[0].base, out.regions[0].top), (bar - 0x10, bar - 1));
    assert_eq!(out.regions[0].device, None);
    assert_eq!((out.regions[2].base, out.regions[2].top), (bar + 0x4000, bar + 0x400F));
    assert_eq!(out.regions[2].device, None);

    let nvme = &out.regions[1];
    assert_eq!((nvme.base, nvme.top), (bar, bar + 0x3FFF));
    assert_eq!(nvme.device, Some(TargetRef::new("nvme")));
    assert_eq!(nvme.offset, 0);
    assert_eq!(nvme.hops, 2);
    assert!(!out.truncated);
    assert_eq!(out.last_base, bar + 0x4010);
}

#[test]
fn uart_registers_from_the_cpu_view() {
    let reg = pc();
    let roots: BTreeSet<_> = [TargetRef::new("cpu0")].into_iter().collect();
    let found = find_mappings(
        &reg,
        &TargetRef::new("com1"),
        &roots,
        &LocateOptions::default(),
    )
    .unwrap();

    let ports: Vec<_> = found
        .mappings
        .iter()
        .map(|m| (m.address, m.device_offset, m.port_space))
        .collect();
    assert_eq!(ports, vec![(0x3F8, 0, true), (0x3FC, 4, true)]);

    let path = probe(
        &reg,
        &TargetRef::new("io"),
        0x3FD,
        &ProbeOptions::default(),
        &mut TraceContext::default(),
    )
    .unwrap();
    let hop = path.terminal_hop().unwrap();
    let terminus = hop.target.as_ref().unwrap();
    let register = annotate(&reg, terminus, hop.local_address).unwrap();
    assert_eq!(register.name, "lsr");
}

#[test]
fn options_load_from_json() {
    let options: MemoryMapOptions = serde_json::from_str(
        r#"{
            "start": 4096,
            "end": 8192,
            "fallback_access": "READ | EXECUTE",
            "filter": { "exclude_classes": ["open-bus"], "skip_loops": false }
        }"#,
    )
    .unwrap();

    assert_eq!(options.start, 0x1000);
    assert_eq!(options.end, 0x2000);
    assert_eq!(options.fallback_access, AccessMask::READ | AccessMask::EXECUTE);
    assert_eq!(options.max_regions, aero_routing::DEFAULT_MAX_REGIONS);
    assert_eq!(options.filter.exclude_classes, vec!["open-bus".to_string()]);
    assert!(!options.filter.skip_loops);

    let locate: LocateOptions = serde_json::from_str(r#"{ "bank": "regs" }"#).unwrap();
    assert_eq!(locate.bank.as_deref(), Some("regs"));
    assert_eq!(locate.max_depth, aero_routing::MAX_DEPTH);
}

#[test]
fn results_serialize_for_reports() {
    let reg = pc();
    let path = probe(
        &reg,
        &TargetRef::new("phys_mem"),
        0x2000,
        &ProbeOptions::default(),
        &mut TraceContext::default(),
    )
    .unwrap();
    let json = serde_json::to_value(&path).unwrap();
    assert_eq!(json["end"], "Terminus");
    assert_eq!(json["hops"][0]["local_address"], 0x2000);
    assert_eq!(json["hops"][0]["loop"], false);
}
