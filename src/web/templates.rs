use chrono::{Datelike, Utc};

use crate::extract::SUPPORTED_EXTENSIONS;

const PAGE_STYLES: &str = r#"        :root { color-scheme: light; }
        * { box-sizing: border-box; }
        body { font-family: "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f1f5f9; color: #0f172a; height: 100vh; display: flex; flex-direction: column; }
        header { padding: 0.9rem 1.5rem; background: #ffffff; border-bottom: 1px solid #e2e8f0; display: flex; gap: 1rem; align-items: center; flex-wrap: wrap; }
        header h1 { margin: 0; font-size: 1.35rem; }
        header .document-name { color: #475569; font-size: 0.95rem; }
        main { flex: 1; display: grid; grid-template-columns: minmax(0, 3fr) minmax(320px, 2fr); gap: 1rem; padding: 1rem 1.5rem; min-height: 0; }
        .panel { background: #ffffff; border: 1px solid #e2e8f0; border-radius: 14px; box-shadow: 0 12px 32px rgba(15, 23, 42, 0.06); display: flex; flex-direction: column; min-height: 0; }
        .toolbar { display: flex; gap: 0.5rem; align-items: center; padding: 0.75rem 1rem; border-bottom: 1px solid #e2e8f0; flex-wrap: wrap; }
        .toolbar .zoom-level { min-width: 3.5rem; text-align: center; font-variant-numeric: tabular-nums; }
        button { padding: 0.5rem 0.9rem; border: none; border-radius: 8px; background: #2563eb; color: #ffffff; font-weight: 600; cursor: pointer; }
        button:hover { background: #1d4ed8; }
        button:disabled { background: #94a3b8; cursor: not-allowed; }
        button.secondary { background: #e2e8f0; color: #0f172a; }
        #pages { flex: 1; overflow: auto; padding: 1rem; background: #e2e8f0; }
        .page { background: #ffffff; margin: 0 auto 1rem; padding: 2rem; max-width: 60rem; border-radius: 6px; box-shadow: 0 2px 8px rgba(15, 23, 42, 0.12); line-height: 1.55; }
        .placeholder { color: #64748b; text-align: center; margin-top: 3rem; }
        #transcript { flex: 1; overflow: auto; padding: 1rem; display: flex; flex-direction: column; gap: 0.75rem; }
        .message { padding: 0.7rem 0.9rem; border-radius: 10px; white-space: pre-wrap; line-height: 1.45; }
        .message.user { background: #dbeafe; align-self: flex-end; max-width: 85%; }
        .message.assistant { background: #f8fafc; border: 1px solid #e2e8f0; }
        .message.summary { background: #fefce8; border: 1px solid #fde68a; }
        .message.error { background: #fef2f2; border: 1px solid #fecaca; color: #b91c1c; }
        form.ask { display: flex; gap: 0.5rem; padding: 0.75rem 1rem; border-top: 1px solid #e2e8f0; }
        form.ask input { flex: 1; padding: 0.6rem 0.75rem; border-radius: 8px; border: 1px solid #cbd5f5; font-size: 1rem; }
        .status { font-size: 0.85rem; color: #475569; }
        .app-footer { text-align: center; font-size: 0.8rem; color: #64748b; padding: 0.4rem; }"#;

const PAGE_SCRIPT: &str = r#"const fileInput = document.getElementById('document-file');
const documentName = document.getElementById('document-name');
const pagesBox = document.getElementById('pages');
const zoomLabel = document.getElementById('zoom-level');
const viewerStatus = document.getElementById('viewer-status');
const summarizeButton = document.getElementById('summarize');
const transcript = document.getElementById('transcript');
const askForm = document.getElementById('ask-form');
const questionInput = document.getElementById('question');
let viewerTimer = null;
let summaryTimer = null;

function addMessage(kind, text) {
    const node = document.createElement('div');
    node.className = `message ${kind}`;
    node.textContent = text;
    transcript.appendChild(node);
    transcript.scrollTop = transcript.scrollHeight;
    return node;
}

async function readError(response, fallback) {
    const payload = await response.json().catch(() => ({}));
    return payload.message || fallback;
}

function showViewer(payload) {
    zoomLabel.textContent = `${Math.round(payload.zoom * 100)}%`;
    if (payload.error) {
        viewerStatus.textContent = `Could not display document: ${payload.error}`;
    } else if (payload.rendering) {
        viewerStatus.textContent = 'Rendering...';
    } else {
        viewerStatus.textContent = '';
    }
    if (payload.pages.length > 0) {
        pagesBox.innerHTML = payload.pages.join('');
    }
    clearTimeout(viewerTimer);
    if (payload.rendering) {
        viewerTimer = setTimeout(refreshViewer, 400);
    }
}

async function refreshViewer() {
    const response = await fetch('/api/viewer');
    if (response.ok) {
        showViewer(await response.json());
    }
}

async function zoom(direction) {
    const response = await fetch('/api/viewer/zoom', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({ direction }),
    });
    if (response.ok) {
        showViewer(await response.json());
    }
}

document.getElementById('zoom-in').addEventListener('click', () => zoom('in'));
document.getElementById('zoom-out').addEventListener('click', () => zoom('out'));

fileInput.addEventListener('change', async () => {
    if (fileInput.files.length === 0) return;
    const data = new FormData();
    data.append('file', fileInput.files[0]);
    viewerStatus.textContent = 'Uploading...';
    const response = await fetch('/api/documents', { method: 'POST', body: data });
    fileInput.value = '';
    if (!response.ok) {
        viewerStatus.textContent = await readError(response, 'Upload failed.');
        return;
    }
    const payload = await response.json();
    documentName.textContent = payload.document.display_name;
    pagesBox.innerHTML = '<p class="placeholder">Rendering...</p>';
    summarizeButton.disabled = false;
    clearTimeout(summaryTimer);
    refreshViewer();
});

summarizeButton.addEventListener('click', async () => {
    summarizeButton.disabled = true;
    const response = await fetch('/api/summarize', { method: 'POST' });
    if (!response.ok) {
        addMessage('error', await readError(response, 'Could not start summarization.'));
        summarizeButton.disabled = false;
        return;
    }
    const payload = await response.json();
    const note = addMessage('summary', 'Summarizing...');
    pollSummary(payload.status_url, note);
});

async function pollSummary(url, note) {
    const response = await fetch(url);
    if (!response.ok) {
        note.textContent = 'Summary status unavailable.';
        summarizeButton.disabled = false;
        return;
    }
    const job = await response.json();
    if (job.status === 'pending' || job.status === 'processing') {
        note.textContent = job.status_detail || 'Summarizing...';
        summaryTimer = setTimeout(() => pollSummary(url, note), 1500);
        return;
    }
    summarizeButton.disabled = false;
    if (job.status === 'completed') {
        note.textContent = job.digest || 'No summaries were produced.';
    } else if (job.status === 'failed') {
        note.className = 'message error';
        note.textContent = job.error_message || 'Summarization failed.';
    } else {
        note.textContent = `Summary ${job.status}.`;
    }
}

askForm.addEventListener('submit', async (event) => {
    event.preventDefault();
    const question = questionInput.value.trim();
    if (!question) return;
    questionInput.value = '';
    addMessage('user', question);

    const response = await fetch('/api/chat', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({ question }),
    });
    if (response.status === 503) {
        const message = await readError(response, 'The AI backend is not running.');
        addMessage('error', message);
        alert(message);
        return;
    }
    if (!response.ok) {
        addMessage('error', await readError(response, 'The question could not be answered.'));
        return;
    }

    const answer = addMessage('assistant', '');
    const reader = response.body.getReader();
    const decoder = new TextDecoder();
    for (;;) {
        const { value, done } = await reader.read();
        if (done) break;
        answer.textContent += decoder.decode(value, { stream: true });
        transcript.scrollTop = transcript.scrollHeight;
    }
});

refreshViewer();"#;

/// Single-page UI: document viewer on the left, assistant on the right.
pub fn render_index_page() -> String {
    let accept = SUPPORTED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(",");
    let footer = render_footer();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>StudyBuddy</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="robots" content="noindex,nofollow">
    <style>
{styles}
    </style>
</head>
<body>
    <header>
        <h1>StudyBuddy</h1>
        <label class="secondary">
            <input id="document-file" type="file" accept="{accept}">
        </label>
        <span id="document-name" class="document-name">No document open</span>
    </header>
    <main>
        <section class="panel">
            <div class="toolbar">
                <button type="button" class="secondary" id="zoom-out">−</button>
                <span id="zoom-level" class="zoom-level">100%</span>
                <button type="button" class="secondary" id="zoom-in">+</button>
                <span id="viewer-status" class="status"></span>
            </div>
            <div id="pages"><p class="placeholder">Open a PDF, DOCX or TXT file to start studying.</p></div>
        </section>
        <section class="panel">
            <div class="toolbar">
                <button type="button" id="summarize" disabled>Summarize document</button>
            </div>
            <div id="transcript"></div>
            <form id="ask-form" class="ask">
                <input id="question" name="question" autocomplete="off" placeholder="Ask about the document...">
                <button type="submit">Ask</button>
            </form>
        </section>
    </main>
    {footer}
    <script>
{script}
    </script>
</body>
</html>"#,
        styles = PAGE_STYLES,
        accept = accept,
        footer = footer,
        script = PAGE_SCRIPT,
    )
}

pub fn render_footer() -> String {
    format!(
        r#"<footer class="app-footer">StudyBuddy © {year}. Answers are generated by a local model and may be wrong.</footer>"#,
        year = Utc::now().year()
    )
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_html(r#"<b class="x">Tom & Jerry's</b>"#),
            "&lt;b class=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/b&gt;"
        );
    }

    #[test]
    fn index_page_accepts_supported_extensions() {
        let page = render_index_page();
        assert!(page.contains(r#"accept=".pdf,.docx,.txt""#));
        assert!(page.contains("/api/chat"));
    }
}
