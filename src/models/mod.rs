pub mod destination;
pub mod workout;

pub use destination::{Destination, Location};
pub use workout::{
  Interval, IntervalSummary, Split, Summary, WorkoutData, WorkoutResult, WorkoutType,
};
