mod discovery;
mod provider;

pub use discovery::{DOCKERFILE, Strategy, discover, find_dockerfiles, resolve_dockerfile};
pub use provider::{
    GitProvider, LocalProvider, RepositoryProvider, checkout_dir_name, clone_url,
};
