pub mod cli;
pub mod config;
pub mod ctx;
pub mod error;
pub mod extract;
pub mod flow;
pub mod fusion;
pub mod io;
pub mod net;
pub mod pipeline;
pub mod schema {
    pub mod v1;
}
pub mod scores;
pub mod split;
pub mod store;
pub mod table;
pub mod weights;
