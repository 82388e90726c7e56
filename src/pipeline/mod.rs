pub mod channel;

pub use channel::{create_channel, record_queue, Receiver, Sender, RECORD_QUEUE_CAPACITY};
