pub mod alerts;
pub mod connections;
pub mod health;
pub mod pipelines;
