pub mod arch_impl;

pub use arch_impl::*;
