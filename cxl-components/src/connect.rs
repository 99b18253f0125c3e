// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Helper connection macros
//!
//! Ports are stored in a `RefCell<Option<>>` so that `run()` can take
//! ownership of them. These macros access them before the simulation starts
//! and report an error if the port has already been taken.

pub use paste::paste;

#[macro_export]
/// Connect an [OutPort](cxl_engine::port::OutPort) to an
/// [InPort](cxl_engine::port::InPort).
///
/// Calls `connect_port_<from_port>()` on the source with the result of
/// `port_<to_port>()` on the destination. Indexed ports use the `_i` variants.
/// Evaluates to a [SimResult](cxl_engine::types::SimResult).
macro_rules! connect_port {
    ($from:expr, $from_port_name:ident => $to:expr, $to_port_name:ident) => {{
        cxl_track::debug!($from.entity ; "Connect {}.{} => {}.{}", $from, stringify!($from_port_name), $to, stringify!($to_port_name));
        $crate::connect::paste! {
            $from.[< connect_port_ $from_port_name >]($to.[< port_ $to_port_name >]())
        }
    }};
    ($from:expr, $from_port_name:ident, $from_index:expr => $to:expr, $to_port_name:ident) => {{
        let from_index: usize = $from_index;
        cxl_track::debug!($from.entity ; "Connect {}.{}[{}] => {}.{}", $from, stringify!($from_port_name), from_index, $to, stringify!($to_port_name));
        $crate::connect::paste! {
            $from.[< connect_port_ $from_port_name _i >](from_index, $to.[< port_ $to_port_name >]())
        }
    }};
    ($from:expr, $from_port_name:ident => $to:expr, $to_port_name:ident, $to_index:expr) => {{
        let to_index: usize = $to_index;
        cxl_track::debug!($from.entity ; "Connect {}.{} => {}.{}[{}]", $from, stringify!($from_port_name), $to, stringify!($to_port_name), to_index);
        $crate::connect::paste! {
            $from.[< connect_port_ $from_port_name >]($to.[< port_ $to_port_name _i >](to_index))
        }
    }};
    ($from:expr, $from_port_name:ident, $from_index:expr => $to:expr, $to_port_name:ident, $to_index:expr) => {{
        let from_index: usize = $from_index;
        let to_index: usize = $to_index;
        cxl_track::debug!($from.entity ; "Connect {}.{}[{}] => {}.{}[{}]", $from, stringify!($from_port_name), from_index, $to, stringify!($to_port_name), to_index);
        $crate::connect::paste! {
            $from.[< connect_port_ $from_port_name _i >](from_index, $to.[< port_ $to_port_name _i >](to_index))
        }
    }};
}

#[macro_export]
/// Connect an output port stored in a `RefCell<Option<OutPort>>`.
macro_rules! connect_tx {
    ($port:expr, $fn:ident ; $port_state:ident) => {
        match $port.borrow_mut().as_mut() {
            Some(port) => port.$fn($port_state),
            None => cxl_engine::sim_error!("Port already taken, unable to connect"),
        }
    };
}

#[macro_export]
/// Access the state of an input port stored in a `RefCell<Option<InPort>>`.
macro_rules! port_rx {
    ($port:expr, $fn:ident) => {
        match $port.borrow().as_ref() {
            Some(port) => port.$fn(),
            None => cxl_engine::sim_error!("Port already taken, unable to connect"),
        }
    };
}

#[macro_export]
/// Take a variable out of a `RefCell<Option<>>`.
///
/// Must be used in a function returning a
/// [SimResult](cxl_engine::types::SimResult) as it returns an error if the
/// value has already been taken.
macro_rules! take_option {
    ($var:expr) => {
        match $var.borrow_mut().take() {
            Some(value) => value,
            None => {
                return cxl_engine::sim_error!(
                    "{} already taken",
                    stringify!($var)
                )
            }
        }
    };
}
