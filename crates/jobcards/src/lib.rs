//! Job card state machine: one repair/service engagement, pending → completed.

pub mod job_card;

pub use job_card::{
    CompleteJobCard, JobCard, JobCardCommand, JobCardCompleted, JobCardEvent, JobCardId,
    JobCardOpened, JobCardStatus, JobCardUpdated, OpenJobCard, PartLine, RequestedPart,
    ServiceAddon, ServiceCharge, UpdateJobCard,
};
