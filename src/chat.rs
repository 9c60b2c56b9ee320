//! In-memory conversation state: the transcript, the pending image queue and the
//! request in flight.
//!
//! Nothing here touches the network. Starting a request hands back a [`ChatRequest`]
//! whose [`Ticket`] must be presented to [`ChatState::resolve`] once the backend answers.

use crate::images::{Attachment, MAX_IMAGES};

pub const SEND_ERROR_LABEL: &str = "Erro ao enviar mensagem: ";
pub const REGENERATE_ERROR_LABEL: &str = "Erro ao regenerar resposta: ";

const LOADING_TEXT: &str = "...";

pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub images: Vec<Attachment>,
    pub is_loading: bool,
}

impl ChatMessage {
    fn user(id: MessageId, text: String, images: Vec<Attachment>) -> Self {
        ChatMessage {
            id,
            role: Role::User,
            text,
            images,
            is_loading: false,
        }
    }

    fn bot(id: MessageId, text: String) -> Self {
        ChatMessage {
            id,
            role: Role::Bot,
            text,
            images: Vec::new(),
            is_loading: false,
        }
    }

    fn placeholder(id: MessageId) -> Self {
        ChatMessage {
            is_loading: true,
            ..ChatMessage::bot(id, LOADING_TEXT.to_string())
        }
    }
}

/// Images waiting to go out with the next message. Never holds more than [`MAX_IMAGES`].
#[derive(Debug, Clone, Default)]
pub struct ImageQueue {
    images: Vec<Attachment>,
}

impl ImageQueue {
    /// Appends in order; anything past the cap is dropped.
    pub fn extend(&mut self, attachments: impl IntoIterator<Item = Attachment>) {
        let free = MAX_IMAGES.saturating_sub(self.images.len());
        self.images.extend(attachments.into_iter().take(free));
    }

    pub fn remove(&mut self, index: usize) {
        if index < self.images.len() {
            self.images.remove(index);
        }
    }

    pub fn is_full(&self) -> bool {
        self.images.len() >= MAX_IMAGES
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.images.iter()
    }

    fn take(&mut self) -> Vec<Attachment> {
        std::mem::take(&mut self.images)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Send,
    Regenerate,
}

/// Identifies the placeholder a pending request will fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub kind: RequestKind,
    pub placeholder: MessageId,
}

/// What the view must send to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub ticket: Ticket,
    pub text: String,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting(Ticket),
}

#[derive(Debug)]
pub struct ChatState {
    input: String,
    transcript: Vec<ChatMessage>,
    images: ImageQueue,
    error: Option<String>,
    phase: Phase,
    next_id: MessageId,
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatState {
    pub fn new() -> Self {
        ChatState {
            input: String::new(),
            transcript: Vec::new(),
            images: ImageQueue::default(),
            error: None,
            phase: Phase::Idle,
            next_id: 1,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, value: String) {
        self.input = value;
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn images(&self) -> &ImageQueue {
        &self.images
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[allow(dead_code)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Submitting(_))
    }

    pub fn can_submit(&self) -> bool {
        !self.is_loading() && !self.input.trim().is_empty()
    }

    pub fn add_images(&mut self, attachments: Vec<Attachment>) {
        self.images.extend(attachments);
    }

    pub fn remove_image(&mut self, index: usize) {
        self.images.remove(index);
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        self.transcript.iter().position(|message| message.id == id)
    }

    /// Moves the input and queued images into the transcript, followed by a loading
    /// placeholder. Does nothing for blank input or while a request is outstanding.
    pub fn submit(&mut self) -> Option<ChatRequest> {
        if !self.can_submit() {
            return None;
        }

        let text = std::mem::take(&mut self.input);
        let images = self.images.take();
        let image_urls = images.iter().map(|image| image.data_uri().to_string()).collect();

        let user_id = self.allocate_id();
        let placeholder = self.allocate_id();
        self.transcript.push(ChatMessage::user(user_id, text.clone(), images));
        self.transcript.push(ChatMessage::placeholder(placeholder));

        let ticket = Ticket {
            kind: RequestKind::Send,
            placeholder,
        };
        self.phase = Phase::Submitting(ticket);
        self.error = None;

        Some(ChatRequest {
            ticket,
            text,
            image_urls,
        })
    }

    /// Turns the settled bot message `bot_id` back into a placeholder and returns a request
    /// replaying the nearest user message before it.
    pub fn regenerate(&mut self, bot_id: MessageId) -> Option<ChatRequest> {
        if self.is_loading() {
            return None;
        }

        let index = self.position(bot_id)?;
        let target = &self.transcript[index];
        if target.role != Role::Bot || target.is_loading {
            return None;
        }

        let previous = self.transcript[..index]
            .iter()
            .rev()
            .find(|message| message.role == Role::User)?;
        let text = previous.text.clone();
        let image_urls = previous
            .images
            .iter()
            .map(|image| image.data_uri().to_string())
            .collect();

        self.transcript[index] = ChatMessage::placeholder(bot_id);

        let ticket = Ticket {
            kind: RequestKind::Regenerate,
            placeholder: bot_id,
        };
        self.phase = Phase::Submitting(ticket);
        self.error = None;

        Some(ChatRequest {
            ticket,
            text,
            image_urls,
        })
    }

    /// Settles a request. A reply fills the placeholder in place; a failure removes it and
    /// raises the error banner. Tickets whose placeholder is gone are ignored.
    pub fn resolve(&mut self, ticket: Ticket, outcome: Result<String, String>) {
        if self.phase == Phase::Submitting(ticket) {
            self.phase = Phase::Idle;
        }

        let Some(index) = self.position(ticket.placeholder) else {
            return;
        };
        if !self.transcript[index].is_loading {
            return;
        }

        match outcome {
            Ok(text) => {
                self.transcript[index] = ChatMessage::bot(ticket.placeholder, text);
            }
            Err(message) => {
                self.transcript.remove(index);
                let label = match ticket.kind {
                    RequestKind::Send => SEND_ERROR_LABEL,
                    RequestKind::Regenerate => REGENERATE_ERROR_LABEL,
                };
                self.error = Some(format!("{}{}", label, message));
            }
        }
    }
}
