/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which receives [events](crate::events) from the node's threads and fires the
//! handlers registered for them.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) insert_block_handlers: Vec<HandlerPtr<InsertBlockEvent>>,
    pub(crate) receive_new_block_handlers: Vec<HandlerPtr<ReceiveNewBlockEvent>>,
    pub(crate) complete_handshake_handlers: Vec<HandlerPtr<CompleteHandshakeEvent>>,
    pub(crate) schedule_fetch_handlers: Vec<HandlerPtr<ScheduleFetchEvent>>,
    pub(crate) start_catch_up_handlers: Vec<HandlerPtr<StartCatchUpEvent>>,
    pub(crate) end_catch_up_handlers: Vec<HandlerPtr<EndCatchUpEvent>>,
    pub(crate) receive_sync_request_handlers: Vec<HandlerPtr<ReceiveSyncRequestEvent>>,
    pub(crate) drop_peer_handlers: Vec<HandlerPtr<DropPeerEvent>>,
    pub(crate) sync_error_handlers: Vec<HandlerPtr<SyncErrorEvent>>,
}

impl EventHandlers {
    /// Register the default logger of every event type in front of any user-defined handlers.
    pub(crate) fn add_loggers(&mut self) {
        self.insert_block_handlers.insert(0, InsertBlockEvent::get_logger());
        self.receive_new_block_handlers.insert(0, ReceiveNewBlockEvent::get_logger());
        self.complete_handshake_handlers.insert(0, CompleteHandshakeEvent::get_logger());
        self.schedule_fetch_handlers.insert(0, ScheduleFetchEvent::get_logger());
        self.start_catch_up_handlers.insert(0, StartCatchUpEvent::get_logger());
        self.end_catch_up_handlers.insert(0, EndCatchUpEvent::get_logger());
        self.receive_sync_request_handlers.insert(0, ReceiveSyncRequestEvent::get_logger());
        self.drop_peer_handlers.insert(0, DropPeerEvent::get_logger());
        self.sync_error_handlers.insert(0, SyncErrorEvent::get_logger());
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.insert_block_handlers.is_empty()
            && self.receive_new_block_handlers.is_empty()
            && self.complete_handshake_handlers.is_empty()
            && self.schedule_fetch_handlers.is_empty()
            && self.start_catch_up_handlers.is_empty()
            && self.end_catch_up_handlers.is_empty()
            && self.receive_sync_request_handlers.is_empty()
            && self.drop_peer_handlers.is_empty()
            && self.sync_error_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::InsertBlock(insert_block_event) =>
                self.insert_block_handlers.iter().for_each(|handler| handler(&insert_block_event)),

            Event::ReceiveNewBlock(receive_new_block_event) =>
                self.receive_new_block_handlers.iter().for_each(|handler| handler(&receive_new_block_event)),

            Event::CompleteHandshake(complete_handshake_event) =>
                self.complete_handshake_handlers.iter().for_each(|handler| handler(&complete_handshake_event)),

            Event::ScheduleFetch(schedule_fetch_event) =>
                self.schedule_fetch_handlers.iter().for_each(|handler| handler(&schedule_fetch_event)),

            Event::StartCatchUp(start_catch_up_event) =>
                self.start_catch_up_handlers.iter().for_each(|handler| handler(&start_catch_up_event)),

            Event::EndCatchUp(end_catch_up_event) =>
                self.end_catch_up_handlers.iter().for_each(|handler| handler(&end_catch_up_event)),

            Event::ReceiveSyncRequest(receive_sync_request_event) =>
                self.receive_sync_request_handlers.iter().for_each(|handler| handler(&receive_sync_request_event)),

            Event::DropPeer(drop_peer_event) =>
                self.drop_peer_handlers.iter().for_each(|handler| handler(&drop_peer_event)),

            Event::SyncError(sync_error_event) =>
                self.sync_error_handlers.iter().for_each(|handler| handler(&sync_error_event)),
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.recv_timeout(Duration::from_millis(10)) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            // Every publisher is gone: keep waiting for the shutdown signal.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(10)),
        }
    })
}
