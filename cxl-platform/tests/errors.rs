// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use cxl_engine::test_helpers::start_test;
use cxl_platform::Platform;

fn build(yaml: &str) {
    let engine = start_test(file!());
    Platform::from_string(&engine, yaml).unwrap();
}

#[test]
#[should_panic(expected = "Duplicate component name m0")]
fn duplicate_component_name() {
    build(
        "
memories:
  - name: m0
    base_address: 0x0
    capacity_bytes: 0x1000
memory_groups:
  - name: m0
    base_address: 0x1000
    capacity_bytes: 0x1000
",
    );
}

#[test]
#[should_panic(expected = "serde_yaml::from_str failed")]
fn unknown_field() {
    build(
        "
crossbars:
  - name: xbar
    latency: 3
",
    );
}

#[test]
#[should_panic(expected = "Failed to parse 'switch.xbar' - unsupported kind")]
fn unknown_kind() {
    build(
        "
crossbars:
  - name: xbar
connections:
  - connect: [switch.xbar, xbar.xbar]
",
    );
}

#[test]
#[should_panic(expected = "'m0' is a mem, not a xbar")]
fn wrong_kind() {
    build(
        "
memories:
  - name: m0
    base_address: 0x0
    capacity_bytes: 0x1000
connections:
  - connect: [xbar.m0, mem.m0]
",
    );
}

#[test]
#[should_panic(expected = "only 2 expected")]
fn connect_three_components() {
    build(
        "
requesters:
  - name: host
    pattern:
      list: []
crossbars:
  - name: xbar
memories:
  - name: m0
    base_address: 0x0
    capacity_bytes: 0x1000
connections:
  - connect: [requester.host, xbar.xbar, mem.m0]
",
    );
}

#[test]
#[should_panic(expected = "Cannot connect mem.m0 to xbar.xbar")]
fn memory_has_no_downstream_side() {
    build(
        "
crossbars:
  - name: xbar
memories:
  - name: m0
    base_address: 0x0
    capacity_bytes: 0x1000
connections:
  - connect: [mem.m0, xbar.xbar]
",
    );
}

#[test]
#[should_panic(expected = "mem.m0 connected upstream more than once")]
fn memory_connected_twice() {
    build(
        "
crossbars:
  - name: x0
  - name: x1
memories:
  - name: m0
    base_address: 0x0
    capacity_bytes: 0x1000
connections:
  - connect: [xbar.x0, mem.m0]
  - connect: [xbar.x1, mem.m0]
",
    );
}

#[test]
#[should_panic(expected = "requester.host has no downstream connection")]
fn unconnected_requester() {
    build(
        "
requesters:
  - name: host
    pattern:
      list:
        - {command: read, address: 0x0, size_bytes: 64}
",
    );
}

#[test]
#[should_panic(expected = "serial links a [0x0, 0x1000) and b [0x800, 0x1800) overlap")]
fn partially_overlapping_serial_links() {
    build(
        "
serial_links:
  - name: a
    base_address: 0x0
    size_bytes: 0x1000
  - name: b
    base_address: 0x800
    size_bytes: 0x1000
",
    );
}

#[test]
#[should_panic(expected = "cannot be split into 3 chunks")]
fn uneven_memory_group() {
    build(
        "
crossbars:
  - name: xbar
memory_groups:
  - name: dram
    base_address: 0x0
    capacity_bytes: 0x1000
    chunks: 3
connections:
  - connect: [xbar.xbar, memory_group.dram]
",
    );
}

#[test]
#[should_panic(expected = "xbar: overlapping address ranges")]
fn overlapping_memories_behind_crossbar() {
    build(
        "
requesters:
  - name: host
    pattern:
      list: []
crossbars:
  - name: xbar
memories:
  - name: m0
    base_address: 0x0
    capacity_bytes: 0x1000
  - name: m1
    base_address: 0x800
    capacity_bytes: 0x1000
connections:
  - connect: [requester.host, xbar.xbar]
  - connect: [xbar.xbar, mem.m0]
  - connect: [xbar.xbar, mem.m1]
",
    );
}

#[test]
#[should_panic(expected = "Unable to read")]
fn missing_file() {
    let engine = start_test(file!());
    Platform::from_file(&engine, std::path::Path::new("/no/such/platform.yaml")).unwrap();
}
