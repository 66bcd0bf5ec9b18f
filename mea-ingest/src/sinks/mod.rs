pub mod csv_dir;

pub use csv_dir::CsvDirSink;
