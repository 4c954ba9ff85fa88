/// Control commands delivered to the recorder through its command channel.
///
/// Commands carry no payload; their meaning depends on the recorder's
/// current state (a `Stop` while idle is a no-op, a `Start` while already
/// recording is ignored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin a recording session.
    Start,
    /// End the current recording session, if any.
    Stop,
    /// Terminate the recorder's run loop.
    Quit,
}
