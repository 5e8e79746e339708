pub mod kernel_queue;
pub mod udp_proxy;
