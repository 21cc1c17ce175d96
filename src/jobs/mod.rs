pub mod tracking_sync;
