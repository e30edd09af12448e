pub mod a1;
pub mod ports;
pub mod provision_use_case;
