mod flows_test;
mod gate_test;
mod helpers;
mod ingest_test;
