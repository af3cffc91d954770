pub mod message;
pub mod service;

pub use message::{
    BatchDecoder, DecodedBatch, PagePool, Payload, Record, RecordBatchBuilder, RecordReader,
    RecordStream,
};
pub use service::GLOBAL_CONFIG;
pub use service::{
    global_config, setup_local_tracing, setup_tracing, AppError, AppResult, RecordsConfig,
};
