//! # Digest Pipeline
//!
//! Declarative, reusable transform chains over small in-memory batches.
//!
//! ## Stages
//!
//! ```text
//! Vec<T>
//!     │
//!     ├──> map      Vec<T> -> Vec<U>       (order and length preserved)
//!     ├──> filter   Vec<T> -> Vec<T>       (ordered sub-sequence)
//!     ├──> reduce   Vec<T> -> A            (seed built from the input)
//!     └──> apply    X      -> Y            (whole-value transform)
//! ```
//!
//! A [`Pipeline`] holds only its ordered stage list. Nothing runs until
//! [`Pipeline::run`] is called, and the same pipeline can be run any number
//! of times. Every stage reports its name and before/after sizes at `debug`
//! level through the `log` facade.
//!
//! ## Example
//!
//! ```rust
//! use digest_pipeline::Pipeline;
//!
//! let pipeline = Pipeline::new()
//!     .map("double", |x: u32| x * 2)
//!     .filter("large", |x: &u32| *x > 4)
//!     .reduce("sum", |acc: Vec<u32>, x| { let mut acc = acc; acc.push(x); acc }, |_| Vec::new())
//!     .apply("reverse", |mut v: Vec<u32>| { v.reverse(); v });
//!
//! assert_eq!(pipeline.run(vec![1, 2, 3, 4]), vec![8, 6]);
//! ```

mod cardinality;
mod pipeline;
mod stage;

pub use cardinality::Cardinality;
pub use pipeline::Pipeline;
pub use stage::{StageInfo, StageKind};
