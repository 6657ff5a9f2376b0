//! Ordered output stream shared by concurrently running jobs
//!
//! Every job that prints takes a ticket in submission order. Only the job
//! holding the active ticket writes to the sink; the others buffer their
//! output against a shared byte budget. When the active job is done the
//! cursor moves past every ticket that already finished, flushing their
//! buffers in ticket order. The sink thus receives exactly the bytes a
//! sequential run would have produced.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Default print buffer capacity, 100 MiB
pub const DEFAULT_PRINT_BUFFER_CAPACITY: usize = 100 * 1024 * 1024;

/// Position of a job in the output order
pub type Ticket = u64;

#[derive(Default)]
struct TicketState {
    next: Ticket,
    active: Ticket,
    /// Bytes that may still be buffered
    budget: usize,
    buffers: BTreeMap<Ticket, Vec<Vec<u8>>>,
    finished: BTreeSet<Ticket>,
    /// Ticket held by the scheduler while it processes documents
    main: Option<Ticket>,
}

impl TicketState {
    fn credit(&mut self, chunks: &[Vec<u8>]) {
        self.budget += chunks.iter().map(Vec::len).sum::<usize>();
    }
}

pub struct OrderedOutput {
    state: Mutex<TicketState>,
    sink: Mutex<Box<dyn Write + Send>>,
    budget_freed: Notify,
}

impl OrderedOutput {
    pub fn new(sink: Box<dyn Write + Send>, capacity: usize) -> Self {
        Self {
            state: Mutex::new(TicketState {
                budget: capacity,
                ..TicketState::default()
            }),
            sink: Mutex::new(sink),
            budget_freed: Notify::new(),
        }
    }

    pub fn stdout(capacity: usize) -> Self {
        Self::new(Box::new(io::stdout()), capacity)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TicketState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_sink(&self, chunks: &[Vec<u8>]) -> io::Result<()> {
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        for chunk in chunks {
            sink.write_all(chunk)?;
        }
        Ok(())
    }

    /// Restarts numbering and hands ticket 0 to the scheduler
    pub fn reset(&self) {
        let mut state = self.lock();
        state.next = 1;
        state.active = 0;
        state.main = Some(0);
        state.buffers.clear();
        state.finished.clear();
    }

    pub fn request_ticket(&self) -> Ticket {
        let mut state = self.lock();
        let ticket = state.next;
        state.next += 1;
        ticket
    }

    /// Releases the scheduler's ticket so that job output can flow
    pub fn main_done(&self) -> io::Result<()> {
        let main = self.lock().main.take();
        match main {
            Some(ticket) => self.declare_done(ticket),
            None => Ok(()),
        }
    }

    /// Takes a new scheduler ticket, possible only once every issued ticket
    /// is done
    pub fn try_reacquire_main(&self) -> bool {
        let mut state = self.lock();
        if state.next != state.active {
            return false;
        }
        state.main = Some(state.next);
        state.next += 1;
        true
    }

    /// The scheduler's ticket, if no ticket was issued after it
    pub fn latest_main(&self) -> Option<Ticket> {
        let state = self.lock();
        state.main.filter(|&main| state.next == main + 1)
    }

    /// Writes `data` for `ticket`, waiting for budget when it has to be
    /// buffered and the budget is exhausted
    pub async fn print(&self, ticket: Ticket, data: &[u8]) -> io::Result<()> {
        self.print_inner(ticket, data, true).await
    }

    /// Like [`print`](Self::print), but buffers past the budget instead of
    /// waiting. Buffered bytes are still debited from the budget, so pooled
    /// jobs wait until they are written. Used by jobs running on the
    /// scheduler task, which would otherwise wait for a ticket the scheduler
    /// itself holds.
    pub async fn print_unbounded(&self, ticket: Ticket, data: &[u8]) -> io::Result<()> {
        self.print_inner(ticket, data, false).await
    }

    async fn print_inner(&self, ticket: Ticket, data: &[u8], bounded: bool) -> io::Result<()> {
        loop {
            let notified = self.budget_freed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if ticket == state.active {
                    let stored = state.buffers.remove(&ticket).unwrap_or_default();
                    state.credit(&stored);
                    // written under the state lock so the cursor cannot move
                    // past this ticket midway
                    self.write_sink(&stored)?;
                    self.write_sink(&[data.to_vec()])?;
                    if !stored.is_empty() {
                        self.budget_freed.notify_waiters();
                    }
                    return Ok(());
                }
                if !bounded || state.budget >= data.len() {
                    state.budget = state.budget.saturating_sub(data.len());
                    state.buffers.entry(ticket).or_default().push(data.to_vec());
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Marks `ticket` as finished; if it is the active one, the cursor
    /// advances past all tickets that finished before
    pub fn declare_done(&self, ticket: Ticket) -> io::Result<()> {
        let mut state = self.lock();
        if ticket != state.active {
            state.finished.insert(ticket);
            return Ok(());
        }

        let own = state.buffers.remove(&ticket).unwrap_or_default();
        state.credit(&own);
        self.write_sink(&own)?;

        let mut next = ticket + 1;
        while state.finished.remove(&next) {
            let chunks = state.buffers.remove(&next).unwrap_or_default();
            state.credit(&chunks);
            self.write_sink(&chunks)?;
            next += 1;
        }
        // the new active ticket may have buffered while waiting
        let pending = state.buffers.remove(&next).unwrap_or_default();
        state.credit(&pending);
        self.write_sink(&pending)?;
        state.active = next;

        self.sink.lock().unwrap_or_else(|e| e.into_inner()).flush()?;
        drop(state);
        self.budget_freed.notify_waiters();
        Ok(())
    }

    /// Flushes the sink when `ticket` is the one writing to it
    pub fn flush(&self, ticket: Ticket) -> io::Result<()> {
        if self.lock().active != ticket {
            return Ok(());
        }
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).flush()
    }

    /// Bytes currently buffered for tickets that are not active
    pub fn buffered(&self) -> usize {
        self.lock()
            .buffers
            .values()
            .flatten()
            .map(Vec::len)
            .sum()
    }
}

/// In-memory sink whose contents stay readable after being handed to an
/// [`OrderedOutput`]
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(std::sync::Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn output(capacity: usize) -> (Arc<OrderedOutput>, SharedBuffer) {
        let sink = SharedBuffer::default();
        let output = Arc::new(OrderedOutput::new(Box::new(sink.clone()), capacity));
        (output, sink)
    }

    #[tokio::test]
    async fn test_late_first_job_keeps_order() {
        let (output, sink) = output(1024);
        let a = output.request_ticket();
        let b = output.request_ticket();
        assert_eq!((a, b), (0, 1));

        let out_a = output.clone();
        let job_a = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            out_a.print(a, b"A\n").await.unwrap();
            out_a.declare_done(a).unwrap();
        });
        let out_b = output.clone();
        let job_b = tokio::spawn(async move {
            out_b.print(b, b"B\n").await.unwrap();
            out_b.declare_done(b).unwrap();
        });

        job_b.await.unwrap();
        assert!(sink.contents().is_empty());
        job_a.await.unwrap();
        assert_eq!(sink.contents(), b"A\nB\n");
    }

    #[tokio::test]
    async fn test_arbitrary_completion_order() {
        let (output, sink) = output(1 << 20);
        let tickets: Vec<Ticket> = (0..8).map(|_| output.request_ticket()).collect();

        let mut handles = Vec::new();
        for &ticket in &tickets {
            let out = output.clone();
            handles.push(tokio::spawn(async move {
                // later tickets finish first
                tokio::time::sleep(Duration::from_millis(5 * (8 - ticket))).await;
                out.print(ticket, format!("{}a ", ticket).as_bytes())
                    .await
                    .unwrap();
                out.print(ticket, format!("{}b ", ticket).as_bytes())
                    .await
                    .unwrap();
                out.declare_done(ticket).unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let expected: String = (0..8).map(|t| format!("{}a {}b ", t, t)).collect();
        assert_eq!(String::from_utf8(sink.contents()).unwrap(), expected);
        assert_eq!(output.buffered(), 0);
    }

    #[tokio::test]
    async fn test_budget_blocks_until_active() {
        let (output, sink) = output(4);
        let first = output.request_ticket();
        let second = output.request_ticket();

        let out = output.clone();
        let waiting = tokio::spawn(async move {
            out.print(second, b"abc").await.unwrap();
            // exceeds the remaining budget, waits for the ticket to activate
            out.print(second, b"defgh").await.unwrap();
            out.declare_done(second).unwrap();
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());
        assert_eq!(output.buffered(), 3);

        output.print(first, b"0").await.unwrap();
        output.declare_done(first).unwrap();
        waiting.await.unwrap();
        assert_eq!(sink.contents(), b"0abcdefgh");
    }

    #[tokio::test]
    async fn test_main_ticket_holds_output() {
        let (output, sink) = output(1024);
        output.reset();
        let job = output.request_ticket();
        output.print_unbounded(job, b"held").await.unwrap();
        output.declare_done(job).unwrap();
        assert!(sink.contents().is_empty());
        assert!(!output.try_reacquire_main());

        output.main_done().unwrap();
        assert_eq!(sink.contents(), b"held");
        assert!(output.try_reacquire_main());
    }

    #[tokio::test]
    async fn test_latest_main_only_without_later_tickets() {
        let (output, sink) = output(1024);
        assert_eq!(output.latest_main(), None);
        output.reset();
        assert_eq!(output.latest_main(), Some(0));

        output.print(0, b"direct").await.unwrap();
        assert_eq!(sink.contents(), b"direct");

        let job = output.request_ticket();
        assert_eq!(output.latest_main(), None);
        output.declare_done(job).unwrap();
        output.main_done().unwrap();
        assert!(output.try_reacquire_main());
        assert_eq!(output.latest_main(), Some(2));
    }

    #[tokio::test]
    async fn test_unbounded_print_debits_budget() {
        let (output, _sink) = output(8);
        output.reset();
        let inline = output.request_ticket();
        let pooled = output.request_ticket();
        output.print_unbounded(inline, b"0123456789").await.unwrap();
        assert_eq!(output.buffered(), 10);

        let out = output.clone();
        let waiting = tokio::spawn(async move { out.print(pooled, b"x").await.unwrap() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        output.declare_done(inline).unwrap();
        output.main_done().unwrap();
        waiting.await.unwrap();
    }
}
