pub mod classifieds;
pub mod export;
pub mod fetcher;
mod html;
pub mod job_board;

pub use classifieds::ClassifiedsAdapter;
pub use export::CsvExporter;
pub use fetcher::ReqwestFetcher;
pub use job_board::JobBoardAdapter;
