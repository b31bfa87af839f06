/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes two top-level command modules:

- `chat`     — Interactive streaming chat with SQL review prompts
- `sessions` — List, rename, and delete saved conversation sessions

These handlers are intentionally small and use the library components:
the chat client, the conversation core, and the session registry.
*/

pub mod chat;
pub mod sessions;
