mod compression;
mod filename;
mod writer;

pub use compression::Compression;
pub use filename::render_filename;
pub use writer::create_archive;
