use serde_json::json;

use super::types::ToolDef;

fn format_param() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Response format: 'compact' (default, human-readable text) or 'full' (JSON with every field). Use full when you need to pass records on to another tool.",
        "enum": ["compact", "full"]
    })
}

fn thread_id_param() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Gmail thread ID as returned by fetch_unread"
    })
}

pub fn available_tools() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "fetch_unread",
            description: "List unread inbox threads with their subject, first sender and cleaned conversation history (quoted replies removed, messages separated by '---'). Social, promotions and updates categories are excluded by default. Start here to find thread IDs.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Gmail search query overriding the configured default, e.g. 'is:unread in:inbox from:alice@example.com'"
                    },
                    "format": format_param()
                }
            }),
        },
        ToolDef {
            name: "generate_reply",
            description: "Draft reply text for one thread using the organization's knowledge base. Pass a record from fetch_unread (format=full). Returns only the reply text; nothing is saved in Gmail. Fails with CONFIGURATION_ERROR when reply generation is not set up.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "thread_id": thread_id_param(),
                    "subject": {"type": "string", "description": "Thread subject"},
                    "sender": {"type": "string", "description": "Sender of the first message"},
                    "history": {"type": "string", "description": "Cleaned conversation history"}
                },
                "required": ["thread_id", "subject", "sender", "history"]
            }),
        },
        ToolDef {
            name: "create_drafts",
            description: "Save reply drafts in Gmail, one per thread, each threaded under its conversation and addressed to the thread's first sender with a 'Re: ' subject. Every thread that gets a draft is marked as read. A failing thread is reported and skipped; the others still proceed.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "responses": {
                        "type": "array",
                        "description": "Replies to save as drafts, processed in order",
                        "items": {
                            "type": "object",
                            "properties": {
                                "thread_id": thread_id_param(),
                                "response": {"type": "string", "description": "Plain-text reply body"}
                            },
                            "required": ["thread_id", "response"]
                        }
                    },
                    "format": format_param()
                },
                "required": ["responses"]
            }),
        },
        ToolDef {
            name: "send_reply",
            description: "Send a reply immediately in an existing thread and mark the thread as read. The subject is prefixed with 'Re: '. This sends real email; prefer create_drafts when a human should review first.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "thread_id": thread_id_param(),
                    "reply": {"type": "string", "description": "Plain-text reply body"},
                    "to": {"type": "string", "description": "Recipient address, e.g. 'Ann <ann@example.com>'"},
                    "subject": {"type": "string", "description": "Original subject, without 'Re: '"}
                },
                "required": ["thread_id", "reply", "to", "subject"]
            }),
        },
        ToolDef {
            name: "send_draft",
            description: "Send one saved draft by its Gmail draft ID. This sends real email.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "draft_id": {"type": "string", "description": "Gmail draft ID"}
                },
                "required": ["draft_id"]
            }),
        },
        ToolDef {
            name: "send_thread_draft",
            description: "Send the first saved draft of a thread. Reports 'No draft found' instead of failing when the thread has no drafts.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "thread_id": thread_id_param(),
                    "format": format_param()
                },
                "required": ["thread_id"]
            }),
        },
    ]
}
