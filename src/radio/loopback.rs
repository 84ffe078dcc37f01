// In-memory radio link
//
// Two connected ends sharing queues. Used by tests and the `simulate`
// command. Faults can be injected on the next transmitted frame.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::{Transport, TransportError};
use crate::protocol::WireFrame;

/// Fault applied to the next frame sent from an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Frame is lost in the air
    Drop,
    /// One bit of the given byte is flipped
    Corrupt(usize),
    /// transmit() reports failure and nothing is sent
    Fail,
}

type Queue = Rc<RefCell<VecDeque<WireFrame>>>;

pub struct LoopbackEnd {
    outbox: Queue,
    inbox: Queue,
    fault: Option<Fault>,
    /// Every frame that made it onto the air from this end
    sent: Vec<WireFrame>,
}

impl LoopbackEnd {
    /// Apply a fault to the next transmitted frame
    pub fn inject(&mut self, fault: Fault) {
        self.fault = Some(fault);
    }

    /// Push raw frames straight into this end's receive queue (replay, forgery)
    pub fn deliver(&mut self, frame: WireFrame) {
        self.inbox.borrow_mut().push_back(frame);
    }

    pub fn sent(&self) -> &[WireFrame] {
        &self.sent
    }

    pub fn pending(&self) -> usize {
        self.inbox.borrow().len()
    }
}

impl Transport for LoopbackEnd {
    fn transmit(&mut self, frame: &WireFrame) -> Result<(), TransportError> {
        let mut frame = *frame;
        match self.fault.take() {
            Some(Fault::Fail) => {
                return Err(TransportError::Rejected("injected failure".to_string()));
            }
            Some(Fault::Drop) => {
                self.sent.push(frame);
                return Ok(());
            }
            Some(Fault::Corrupt(index)) => {
                let bytes = frame.as_bytes_mut();
                let index = index % bytes.len();
                bytes[index] ^= 0x01;
            }
            None => {}
        }
        self.sent.push(frame);
        self.outbox.borrow_mut().push_back(frame);
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<WireFrame>, TransportError> {
        Ok(self.inbox.borrow_mut().pop_front())
    }
}

/// Constructor for a connected pair of ends
pub struct LoopbackLink;

impl LoopbackLink {
    pub fn pair() -> (LoopbackEnd, LoopbackEnd) {
        let a_to_b: Queue = Rc::default();
        let b_to_a: Queue = Rc::default();
        let a = LoopbackEnd {
            outbox: a_to_b.clone(),
            inbox: b_to_a.clone(),
            fault: None,
            sent: Vec::new(),
        };
        let b = LoopbackEnd {
            outbox: b_to_a,
            inbox: a_to_b,
            fault: None,
            sent: Vec::new(),
        };
        (a, b)
    }
}
