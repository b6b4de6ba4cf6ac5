//! GLAD (Generative model of Labels, Abilities, and Difficulties)
//! estimated by expectation-maximization.
//!
//! Every worker `w` has an ability `alpha(w)` and every task `t` a
//! log-inverse-difficulty `beta(t)`. A worker answers a task correctly
//! with probability `sigmoid(alpha(w) * exp(beta(t)))` and otherwise
//! picks one of the other labels uniformly at random.
//!
//! ```ignore
//! use lentil::{Glad, GladOptions};
//!
//! let data = crowd_beans::io::read_crowd_labels("answers.tsv.gz", None, true)?;
//! let fit = Glad::new(GladOptions::default()).fit(&data)?;
//! for (task, label) in fit.named_labels() {
//!     println!("{}\t{}", task, label);
//! }
//! ```

pub mod em;
pub mod estep;
pub mod joined_observations;
pub mod model_state;
pub mod mstep;
pub mod objective;
pub mod optimizer;
pub mod stable_math;

pub use em::{FitStatus, Glad, GladFit, GladOptions};
pub use optimizer::{ConjugateGradient, Minimizer, MinimizerOut};
