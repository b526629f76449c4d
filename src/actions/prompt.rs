//! Keep/delete decisions for one group.
//!
//! Answers are parsed by [`parse_preserve_selection`], a pure function, so
//! the interactive loop in [`PreservePrompt`] only deals with I/O. Indices
//! are 1-based positions in the sorted member list, as shown to the user.
//!
//! Answers come from an [`AnswerSource`]. Any [`BufRead`] is one, but a
//! blocked read cannot notice Ctrl+C, so the terminal uses [`ChannelLines`]:
//! stdin is read on a helper thread and the prompt polls for lines while
//! watching the shutdown flag.

use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long one poll of an [`AnswerSource`] may wait for a line.
pub const ANSWER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Message printed after an invalid answer.
pub const INVALID_ANSWER: &str =
    "Please respond with comma-separated file numbers or 'all' or 'n'.";

/// Why an answer could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// A comma-separated item is not a number.
    #[error("'{0}' is not a file number")]
    NotANumber(String),

    /// A number is outside `1..=max`.
    #[error("file number {index} is out of range 1 - {max}")]
    OutOfRange {
        /// Offending number
        index: usize,
        /// Group size
        max: usize,
    },
}

/// Parse an answer to the preserve question for a group of `group_size`.
///
/// Returns the 1-based indices to delete, ascending:
///
/// - `all` / `a`: keep everything, delete nothing
/// - `none` / `no` / `n`: delete everything
/// - `1,3`: keep the listed members, delete the rest
///
/// Matching is case-insensitive and whitespace around items is ignored.
///
/// # Errors
///
/// Any item that is not a number in `1..=group_size` rejects the whole answer.
///
/// # Example
///
/// ```
/// use imgdupes::actions::prompt::parse_preserve_selection;
///
/// assert_eq!(parse_preserve_selection("all", 3).unwrap(), Vec::<usize>::new());
/// assert_eq!(parse_preserve_selection("none", 3).unwrap(), vec![1, 2, 3]);
/// assert_eq!(parse_preserve_selection("1,3", 3).unwrap(), vec![2]);
/// ```
pub fn parse_preserve_selection(
    input: &str,
    group_size: usize,
) -> Result<Vec<usize>, SelectionError> {
    let answer = input.trim().to_lowercase();
    match answer.as_str() {
        "all" | "a" => return Ok(Vec::new()),
        "none" | "no" | "n" => return Ok((1..=group_size).collect()),
        _ => {}
    }

    let mut keep = BTreeSet::new();
    for item in answer.split(',') {
        let item = item.trim();
        let index: usize = item
            .parse()
            .map_err(|_| SelectionError::NotANumber(item.to_string()))?;
        if index == 0 || index > group_size {
            return Err(SelectionError::OutOfRange {
                index,
                max: group_size,
            });
        }
        keep.insert(index);
    }

    Ok((1..=group_size).filter(|i| !keep.contains(i)).collect())
}

/// Result of waiting briefly for an answer line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerPoll {
    /// A complete line, newline included if there was one.
    Line(String),
    /// No line yet; ask again.
    Pending,
    /// The input ended.
    Closed,
}

/// Where answer lines come from.
pub trait AnswerSource {
    /// Wait up to `timeout` for the next line.
    ///
    /// # Errors
    ///
    /// Returns the underlying read error.
    fn poll_line(&mut self, timeout: Duration) -> io::Result<AnswerPoll>;
}

impl<R: BufRead> AnswerSource for R {
    /// Blocks until a line or end of input; `timeout` is not honored.
    fn poll_line(&mut self, _timeout: Duration) -> io::Result<AnswerPoll> {
        let mut line = String::new();
        match self.read_line(&mut line) {
            Ok(0) => Ok(AnswerPoll::Closed),
            Ok(_) => Ok(AnswerPoll::Line(line)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(AnswerPoll::Pending),
            Err(e) => Err(e),
        }
    }
}

/// Lines delivered over a channel, usually by a thread reading stdin.
///
/// The channel disconnecting counts as end of input.
#[derive(Debug)]
pub struct ChannelLines {
    lines: Receiver<io::Result<String>>,
}

impl ChannelLines {
    /// Read lines from `lines`.
    #[must_use]
    pub fn new(lines: Receiver<io::Result<String>>) -> Self {
        Self { lines }
    }

    /// Start a detached thread that forwards stdin line by line.
    ///
    /// The thread ends at end of input, on a read error (forwarded first), or
    /// once this reader is dropped and the next line arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn stdin() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("stdin-lines".to_string())
            .spawn(move || {
                let mut input = io::stdin().lock();
                loop {
                    let mut line = String::new();
                    let next = match input.read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) => Ok(line),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => Err(e),
                    };
                    let failed = next.is_err();
                    if tx.send(next).is_err() || failed {
                        break;
                    }
                }
            })?;
        Ok(Self::new(rx))
    }
}

impl AnswerSource for ChannelLines {
    fn poll_line(&mut self, timeout: Duration) -> io::Result<AnswerPoll> {
        match self.lines.recv_timeout(timeout) {
            Ok(Ok(line)) => Ok(AnswerPoll::Line(line)),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(AnswerPoll::Pending),
            Err(RecvTimeoutError::Disconnected) => Ok(AnswerPoll::Closed),
        }
    }
}

/// Errors from the decision loop itself.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Reading the answer or writing the question failed.
    #[error("prompt I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Something that decides which members of a group to delete.
pub trait DecisionSource {
    /// Decide for a group of `group_size` members.
    ///
    /// Returns the 1-based indices to delete, or `None` if the decision was
    /// abandoned (end of input or shutdown).
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] if the decision could not be obtained.
    fn decide(&mut self, group_size: usize) -> Result<Option<Vec<usize>>, PromptError>;
}

/// Scripted policy: keep the first member of each sorted group, delete the rest.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepFirst;

impl DecisionSource for KeepFirst {
    fn decide(&mut self, group_size: usize) -> Result<Option<Vec<usize>>, PromptError> {
        Ok(Some((2..=group_size).collect()))
    }
}

/// States of one interactive question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptState {
    /// The question is about to be (re)asked.
    Prompting,
    /// The question was asked and no answer has arrived yet.
    Waiting,
    /// An answer was read and is being checked.
    Validating(String),
    /// A valid answer was given; holds the indices to delete.
    Resolved(Vec<usize>),
    /// No answer will come.
    Abandoned,
}

/// Interactive preserve question over an answer source and a writer.
pub struct PreservePrompt<R, W> {
    reader: R,
    writer: W,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl<R: AnswerSource, W: Write> PreservePrompt<R, W> {
    /// Create a prompt reading answers from `reader` and writing to `writer`.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            shutdown_flag: None,
        }
    }

    /// Abandon the question when this flag is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Give back the reader and writer.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Advance the question by one state.
    ///
    /// `Waiting` polls the source once, for at most [`ANSWER_POLL_INTERVAL`],
    /// and becomes `Abandoned` as soon as the shutdown flag is raised.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::Io`] if reading or writing fails.
    pub fn step(&mut self, state: PromptState, group_size: usize) -> Result<PromptState, PromptError> {
        let open = matches!(state, PromptState::Prompting | PromptState::Waiting);
        if open && self.is_shutdown_requested() {
            return Ok(PromptState::Abandoned);
        }
        let next = match state {
            PromptState::Prompting => {
                write!(
                    self.writer,
                    "preserve files [1 - {}, all, none]: ",
                    group_size
                )?;
                self.writer.flush()?;
                PromptState::Waiting
            }
            PromptState::Waiting => match self.reader.poll_line(ANSWER_POLL_INTERVAL)? {
                _ if self.is_shutdown_requested() => PromptState::Abandoned,
                AnswerPoll::Line(line) => PromptState::Validating(line),
                AnswerPoll::Pending => PromptState::Waiting,
                AnswerPoll::Closed => PromptState::Abandoned,
            },
            PromptState::Validating(line) => match parse_preserve_selection(&line, group_size) {
                Ok(delete) => PromptState::Resolved(delete),
                Err(e) => {
                    log::debug!("Rejected answer {:?}: {}", line.trim(), e);
                    writeln!(self.writer, "Invalid answer: {}. {}", e, INVALID_ANSWER)?;
                    PromptState::Prompting
                }
            },
            done @ (PromptState::Resolved(_) | PromptState::Abandoned) => done,
        };
        Ok(next)
    }
}

impl<R: AnswerSource, W: Write> DecisionSource for PreservePrompt<R, W> {
    fn decide(&mut self, group_size: usize) -> Result<Option<Vec<usize>>, PromptError> {
        let mut state = PromptState::Prompting;
        loop {
            state = self.step(state, group_size)?;
            match state {
                PromptState::Resolved(delete) => return Ok(Some(delete)),
                PromptState::Abandoned => return Ok(None),
                _ => {}
            }
        }
    }
}
