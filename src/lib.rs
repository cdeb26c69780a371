// Probing engine - endpoint, tracer facade and hop statistics
pub mod net;
pub mod state;
pub mod trace;

// Enclosing-program pieces, kept public so the binary stays thin
pub mod cli;
pub mod lookup;
