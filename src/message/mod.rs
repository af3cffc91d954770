pub mod batch;
pub mod batch_header;
pub mod codec;
pub mod constants;
pub mod control;
pub mod finalize;
pub mod optimized;
pub mod page;
pub mod payload;
pub mod reader;
pub mod record;
pub mod stream;

pub use batch::{
    new_control_batch, Batch, BatchMetadata, ControlBatch, Message, MessageSet, RecordBatch,
};
pub use batch_header::{Attributes, BatchHeader};
pub use codec::{decode_record_stream, BatchDecoder, DecodedBatch, RecordBatchBuilder};
pub use control::ControlRecord;
pub use finalize::for_each_record;
pub use optimized::{OptimizedRecord, OptimizedRecordReader};
pub use page::{Page, PagePool, PageRef, PageWriter};
pub use payload::Payload;
pub use reader::{
    concat_record_reader, multi_record_reader, new_record_reader, reset_record_reader,
    reset_record_readers, EmptyRecordReader, MultiRecordReader, PlainRecordReader, RecordReader,
    Resetter,
};
pub use record::{make_time, Header, Record};
pub use stream::RecordStream;
