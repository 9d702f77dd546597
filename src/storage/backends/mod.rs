mod blob_storage;
mod filesystem;
mod register;

#[cfg(test)]
pub use filesystem::FileSystemBackend;
pub use register::StorageConfig;
