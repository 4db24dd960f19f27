pub mod generation_request_repo;

pub use generation_request_repo::GenerationRequestRepo;
