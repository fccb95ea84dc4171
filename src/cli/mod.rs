pub mod connect;
pub mod io;
pub mod render;
pub mod run;
pub mod specials;

pub use connect::obtain_control_stream;
pub use run::run;
