#![allow(dead_code)]

pub mod qbit;
pub mod socket_guard;
