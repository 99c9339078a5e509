pub mod protocol;
pub mod states;
pub mod vacancy;

pub use states::{ProbeTag, VacancyStatus};
pub use vacancy::Vacancy;
