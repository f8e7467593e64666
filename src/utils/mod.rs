pub mod stop;

pub use stop::StopSignal;
