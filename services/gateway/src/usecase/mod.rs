pub mod audit;
pub mod deliver;
pub mod flows;
pub mod gate;
pub mod ingest;
pub mod logs;
pub mod replay;
pub mod resolve;
pub mod stream;
pub mod worker;
