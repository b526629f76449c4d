//! What happens to duplicate groups once they are found.
//!
//! - [`sort`]: member ordering and canonical group order
//! - [`prompt`]: keep/delete decisions, interactive or scripted
//! - [`delete`]: file removal, permanent or to the trash
//! - [`audit`]: duplicate-sets and delete logs
//! - [`workflow`]: [`PreserveWorkflow`], which ties the above together
//!
//! ```
//! use imgdupes::actions::{parse_preserve_selection, SortCriterion};
//!
//! assert_eq!(SortCriterion::default(), SortCriterion::Size);
//! assert_eq!(parse_preserve_selection("2", 3).unwrap(), vec![1, 3]);
//! ```

pub mod audit;
pub mod delete;
pub mod prompt;
pub mod sort;
pub mod workflow;

pub use audit::{render_groups, AuditError, AuditLog};
pub use delete::{
    delete_batch, delete_file, BatchDeleteResult, DeleteConfig, DeleteError, DeleteOutcome,
    DeleteResult,
};
pub use prompt::{
    parse_preserve_selection, AnswerPoll, AnswerSource, ChannelLines, DecisionSource, KeepFirst,
    PreservePrompt, PromptError, PromptState, SelectionError,
};
pub use sort::{canonicalize_groups, sort_group_members, MemberInfo, SortCriterion};
pub use workflow::{
    Completion, PreserveWorkflow, WorkflowConfig, WorkflowError, WorkflowReport,
};
