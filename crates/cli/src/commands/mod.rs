pub mod analysis;
pub mod images;
pub mod rules;
pub mod util;
pub mod workspace;

pub use analysis::*;
pub use images::*;
pub use rules::*;
pub use util::*;
pub use workspace::*;
