//! Concrete destination plugins.

pub mod command;
pub mod ocr;
pub mod printer;
pub mod upload;

pub use ocr::OcrPlugin;
pub use printer::{DefaultPrinterDialog, PrintDialog, PrinterPlugin};
pub use upload::{HttpPhotoService, PhotoService, UploadPlugin};
