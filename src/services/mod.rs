pub mod download;
pub mod network;
pub mod reclaimer;
pub mod storage_service;
pub mod upload_batch;
