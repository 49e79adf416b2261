pub mod seed_folder;

pub use seed_folder::SeedFolder;
