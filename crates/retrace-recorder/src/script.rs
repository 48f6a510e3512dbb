//! The injected capture layer: a floating control widget plus
//! capture-phase listeners that forward raw interaction events over the
//! host binding. Injection is idempotent per document: a live instance and
//! widget short-circuit reinjection so listeners are never doubled.

use retrace_core::optimizer::WIDGET_ID;
use retrace_core::selector::CAPTURE_MARKER_ATTR;

/// Name of the host callback the script invokes with JSON event payloads.
pub const CAPTURE_BINDING: &str = "__retraceCapture";

/// Render the capture script with the widget id, binding name, and marker
/// attribute substituted.
pub fn build_capture_script() -> String {
    CAPTURE_SCRIPT_TEMPLATE
        .replace("__WIDGET_ID__", WIDGET_ID)
        .replace("__BINDING__", CAPTURE_BINDING)
        .replace("__MARKER_ATTR__", CAPTURE_MARKER_ATTR)
}

const CAPTURE_SCRIPT_TEMPLATE: &str = r##"
(function() {
  if (window.__retraceRecorder && document.getElementById('__WIDGET_ID__')) {
    return window.__retraceRecorder;
  }
  // A stale instance without its widget (or vice versa) is rebuilt from
  // scratch; the previous instance reference is dropped.
  if (window.__retraceRecorder) {
    window.__retraceRecorder.teardown?.();
    window.__retraceRecorder = undefined;
  }
  document.getElementById('__WIDGET_ID__')?.remove();

  const INPUT_DEBOUNCE_MS = 500;
  const SCROLL_DEBOUNCE_MS = 1000;
  const SPECIAL_KEYS = ['Enter', 'Escape', 'Tab', 'ArrowUp', 'ArrowDown', 'ArrowLeft', 'ArrowRight'];

  const state = { recording: false, paused: false };
  const elementIds = new WeakMap();
  let nextElementId = 1;
  let nextMarker = 1;

  function elementId(el) {
    if (!elementIds.has(el)) elementIds.set(el, nextElementId++);
    return elementIds.get(el);
  }

  function stampMarker(el) {
    const marker = 'm' + (nextMarker++);
    el.setAttribute('__MARKER_ATTR__', marker);
    return marker;
  }

  function send(event) {
    if (typeof window.__BINDING__ !== 'function') return;
    window.__BINDING__(JSON.stringify(event));
  }

  function sendWhileRecording(event) {
    if (!state.recording || state.paused) return;
    send(event);
  }

  function inWidget(el) {
    return !!(el && el.closest && el.closest('#__WIDGET_ID__'));
  }

  function describeParent(el) {
    const parent = el.parentElement;
    if (!parent || parent === document.documentElement) return null;
    return {
      tag: parent.tagName.toLowerCase(),
      id: parent.id || null,
      classes: Array.from(parent.classList)
    };
  }

  function describe(el) {
    const siblings = el.parentElement ? Array.from(el.parentElement.children) : [el];
    const sameTag = siblings.filter(s => s.tagName === el.tagName);
    const text = (el.textContent || '').trim().slice(0, 60) || null;
    return {
      tag: el.tagName.toLowerCase(),
      id: el.id || null,
      classes: Array.from(el.classList),
      name: el.getAttribute('name'),
      type: el.getAttribute('type'),
      role: el.getAttribute('role'),
      aria_label: el.getAttribute('aria-label'),
      placeholder: el.getAttribute('placeholder'),
      data_test: el.getAttribute('data-test'),
      data_testid: el.getAttribute('data-testid'),
      nth_of_type: sameTag.indexOf(el) + 1,
      nth_child: siblings.indexOf(el) + 1,
      text: text,
      parent: describeParent(el)
    };
  }

  function describeField(el) {
    return {
      type: el.getAttribute('type'),
      name: el.getAttribute('name'),
      id: el.id || null,
      placeholder: el.getAttribute('placeholder'),
      aria_label: el.getAttribute('aria-label'),
      autocomplete: el.getAttribute('autocomplete'),
      max_length: el.maxLength > 0 ? el.maxLength : null
    };
  }

  function describeForm(el) {
    const form = el.closest('form');
    if (!form) return null;
    return {
      id: form.id || null,
      action: form.getAttribute('action'),
      classes: Array.from(form.classList),
      aria_label: form.getAttribute('aria-label'),
      title: form.getAttribute('title'),
      has_password_input: !!form.querySelector('input[type="password"]')
    };
  }

  const INTERACTIVE_ROLES = ['button', 'link', 'menuitem', 'tab', 'option', 'checkbox', 'radio', 'switch'];
  const INTERACTIVE_TAGS = ['A', 'BUTTON', 'INPUT', 'SELECT', 'TEXTAREA', 'LABEL', 'SUMMARY'];

  // Walk up from the raw event target to the element the user meant to
  // activate; capped at five ancestors.
  function resolveClickable(el) {
    let current = el;
    for (let depth = 0; depth < 5 && current && current !== document.body; depth++) {
      if (INTERACTIVE_TAGS.includes(current.tagName)) return current;
      if (current.hasAttribute('onclick') || typeof current.onclick === 'function') return current;
      const role = current.getAttribute('role');
      if (role && INTERACTIVE_ROLES.includes(role)) return current;
      if (current.getAttribute('data-action') || current.getAttribute('data-toggle') || current.getAttribute('data-click')) return current;
      if (window.getComputedStyle(current).cursor === 'pointer') return current;
      current = current.parentElement;
    }
    return el;
  }

  function ancestorIds(el, count) {
    const ids = [];
    let current = el.parentElement;
    while (current && current !== document.body && ids.length < count) {
      ids.push(elementId(current));
      current = current.parentElement;
    }
    return ids;
  }

  let hoverRuleCache = null;
  function hoverRuleSelectors() {
    if (hoverRuleCache) return hoverRuleCache;
    const selectors = [];
    for (const sheet of document.styleSheets) {
      let rules;
      try { rules = sheet.cssRules; } catch (_crossOrigin) { continue; }
      if (!rules) continue;
      for (const rule of rules) {
        if (rule.selectorText && rule.selectorText.includes(':hover')) {
          selectors.push(rule.selectorText);
        }
      }
    }
    hoverRuleCache = selectors;
    return selectors;
  }

  function hasHoverRule(el) {
    for (const selectorText of hoverRuleSelectors()) {
      for (const part of selectorText.split(',')) {
        if (!part.includes(':hover')) continue;
        const base = part.replace(/:hover/g, '').trim();
        if (!base) continue;
        try { if (el.matches(base)) return true; } catch (_bad) {}
      }
    }
    return false;
  }

  // --- listeners (capture phase, purely observational) ---

  const listeners = [];
  function listen(type, handler) {
    document.addEventListener(type, handler, true);
    listeners.push([type, handler]);
  }

  listen('click', (e) => {
    if (inWidget(e.target)) return;
    const el = resolveClickable(e.target);
    sendWhileRecording({
      kind: 'click',
      element: describe(el),
      marker: stampMarker(el),
      element_id: elementId(el),
      ancestor_ids: ancestorIds(el, 3),
      text: (el.textContent || el.value || '').trim().slice(0, 100) || null,
      href: el.getAttribute ? el.getAttribute('href') : null,
      timestamp: Date.now()
    });
  });

  const inputTimers = new WeakMap();
  const lastSentValues = new WeakMap();
  listen('input', (e) => {
    const el = e.target;
    if (inWidget(el)) return;
    const editable = el.tagName === 'INPUT' || el.tagName === 'TEXTAREA' || el.isContentEditable;
    if (!editable || el.type === 'file') return;
    clearTimeout(inputTimers.get(el));
    inputTimers.set(el, setTimeout(() => {
      const value = el.isContentEditable ? el.textContent : el.value;
      if (lastSentValues.get(el) === value) return;
      lastSentValues.set(el, value);
      sendWhileRecording({
        kind: 'input',
        element: describe(el),
        marker: stampMarker(el),
        field: describeField(el),
        form: describeForm(el),
        value: value,
        timestamp: Date.now()
      });
    }, INPUT_DEBOUNCE_MS));
  });

  listen('change', (e) => {
    const el = e.target;
    if (inWidget(el)) return;
    if (el.tagName === 'SELECT') {
      const option = el.selectedOptions && el.selectedOptions[0];
      sendWhileRecording({
        kind: 'select_change',
        element: describe(el),
        marker: stampMarker(el),
        value: el.value,
        label: option ? option.textContent.trim() : null,
        timestamp: Date.now()
      });
    } else if (el.tagName === 'INPUT' && el.type === 'file') {
      const file = el.files && el.files[0];
      sendWhileRecording({
        kind: 'file_select',
        element: describe(el),
        marker: stampMarker(el),
        filename: file ? file.name : null,
        timestamp: Date.now()
      });
    }
  });

  const scrollTimers = new WeakMap();
  listen('scroll', (e) => {
    const raw = e.target;
    const el = raw === document ? document.documentElement : raw;
    if (inWidget(el)) return;
    clearTimeout(scrollTimers.get(el));
    scrollTimers.set(el, setTimeout(() => {
      const x = el === document.documentElement ? window.scrollX : el.scrollLeft;
      const y = el === document.documentElement ? window.scrollY : el.scrollTop;
      sendWhileRecording({
        kind: 'scroll',
        element: describe(el),
        marker: stampMarker(el),
        x: x,
        y: y,
        timestamp: Date.now()
      });
    }, SCROLL_DEBOUNCE_MS));
  });

  let lastHovered = null;
  listen('mouseover', (e) => {
    const el = e.target;
    if (inWidget(el) || el === lastHovered) return;
    lastHovered = el;
    if (!hasHoverRule(el)) return;
    sendWhileRecording({
      kind: 'hover',
      element: describe(el),
      marker: stampMarker(el),
      element_id: elementId(el),
      timestamp: Date.now()
    });
  });

  listen('keydown', (e) => {
    if (inWidget(e.target)) return;
    if (!SPECIAL_KEYS.includes(e.key)) return;
    const modifiers = [];
    if (e.ctrlKey) modifiers.push('control');
    if (e.shiftKey) modifiers.push('shift');
    if (e.altKey) modifiers.push('alt');
    if (e.metaKey) modifiers.push('meta');
    sendWhileRecording({
      kind: 'keydown',
      key: e.key,
      modifiers: modifiers,
      timestamp: Date.now()
    });
  });

  listen('dragstart', (e) => {
    if (inWidget(e.target)) return;
    sendWhileRecording({
      kind: 'drag_start',
      element: describe(e.target),
      marker: stampMarker(e.target),
      x: e.clientX,
      y: e.clientY,
      timestamp: Date.now()
    });
  });

  listen('dragend', (e) => {
    if (inWidget(e.target)) return;
    const drop = document.elementFromPoint(e.clientX, e.clientY);
    sendWhileRecording({
      kind: 'drag_end',
      element: drop ? describe(drop) : null,
      marker: drop ? stampMarker(drop) : null,
      x: e.clientX,
      y: e.clientY,
      timestamp: Date.now()
    });
  });

  // --- widget ---

  const widget = document.createElement('div');
  widget.id = '__WIDGET_ID__';
  widget.style.cssText = 'position:fixed;top:16px;right:16px;z-index:2147483647;background:rgba(24,24,27,0.95);color:#fafafa;font:12px system-ui,sans-serif;border-radius:8px;padding:8px;box-shadow:0 4px 12px rgba(0,0,0,0.4);min-width:180px;';
  widget.innerHTML =
    '<div data-role="bar" style="cursor:move;display:flex;justify-content:space-between;align-items:center;margin-bottom:6px;">' +
    '<span data-role="status">idle</span>' +
    '<button data-role="collapse" style="background:none;border:none;color:#fafafa;cursor:pointer;">&#8211;</button>' +
    '</div>' +
    '<div data-role="body">' +
    '<input data-role="name" placeholder="scenario name" style="width:100%;box-sizing:border-box;margin-bottom:6px;padding:3px;border-radius:4px;border:1px solid #3f3f46;background:#27272a;color:#fafafa;">' +
    '<div style="display:flex;gap:4px;">' +
    '<button data-role="start" style="flex:1;">Record</button>' +
    '<button data-role="pause" style="flex:1;" disabled>Pause</button>' +
    '<button data-role="save" style="flex:1;" disabled>Save</button>' +
    '<button data-role="cancel" style="flex:1;" disabled>&#10005;</button>' +
    '</div>' +
    '</div>';
  document.documentElement.appendChild(widget);

  const parts = {
    status: widget.querySelector('[data-role="status"]'),
    name: widget.querySelector('[data-role="name"]'),
    start: widget.querySelector('[data-role="start"]'),
    pause: widget.querySelector('[data-role="pause"]'),
    save: widget.querySelector('[data-role="save"]'),
    cancel: widget.querySelector('[data-role="cancel"]'),
    collapse: widget.querySelector('[data-role="collapse"]'),
    body: widget.querySelector('[data-role="body"]'),
    bar: widget.querySelector('[data-role="bar"]')
  };

  function reflect() {
    parts.status.textContent = state.recording ? (state.paused ? 'paused' : 'recording') : 'idle';
    parts.start.disabled = state.recording;
    parts.pause.disabled = !state.recording;
    parts.pause.textContent = state.paused ? 'Resume' : 'Pause';
    parts.save.disabled = !state.recording;
    parts.cancel.disabled = !state.recording;
  }

  parts.start.addEventListener('click', () => {
    state.recording = true;
    state.paused = false;
    reflect();
    send({ kind: 'start', url: location.href, timestamp: Date.now() });
  });
  parts.pause.addEventListener('click', () => {
    state.paused = !state.paused;
    reflect();
    send({ kind: state.paused ? 'pause' : 'resume', timestamp: Date.now() });
  });
  parts.save.addEventListener('click', () => {
    const name = parts.name.value.trim();
    if (!name) {
      parts.status.textContent = 'name required';
      return;
    }
    state.recording = false;
    state.paused = false;
    reflect();
    send({ kind: 'save', name: name, url: location.href, timestamp: Date.now() });
  });
  parts.cancel.addEventListener('click', () => {
    state.recording = false;
    state.paused = false;
    reflect();
    send({ kind: 'cancel', timestamp: Date.now() });
  });
  parts.collapse.addEventListener('click', () => {
    const collapsed = parts.body.style.display === 'none';
    parts.body.style.display = collapsed ? '' : 'none';
    send({ kind: 'widget', x: widget.offsetLeft, y: widget.offsetTop, collapsed: !collapsed, timestamp: Date.now() });
  });

  let dragOrigin = null;
  parts.bar.addEventListener('mousedown', (e) => {
    dragOrigin = { x: e.clientX - widget.offsetLeft, y: e.clientY - widget.offsetTop };
    e.preventDefault();
  });
  document.addEventListener('mousemove', (e) => {
    if (!dragOrigin) return;
    widget.style.left = (e.clientX - dragOrigin.x) + 'px';
    widget.style.top = (e.clientY - dragOrigin.y) + 'px';
    widget.style.right = 'auto';
  }, true);
  document.addEventListener('mouseup', () => {
    if (!dragOrigin) return;
    dragOrigin = null;
    send({ kind: 'widget', x: widget.offsetLeft, y: widget.offsetTop, collapsed: parts.body.style.display === 'none', timestamp: Date.now() });
  }, true);

  const instance = {
    setState(pushed) {
      state.recording = pushed.recording ?? state.recording;
      state.paused = pushed.paused ?? state.paused;
      if (pushed.name !== undefined && pushed.name !== null) parts.name.value = pushed.name;
      if (pushed.x !== undefined && pushed.x !== null) {
        widget.style.left = pushed.x + 'px';
        widget.style.top = pushed.y + 'px';
        widget.style.right = 'auto';
      }
      if (pushed.collapsed !== undefined) {
        parts.body.style.display = pushed.collapsed ? 'none' : '';
      }
      reflect();
    },
    teardown() {
      for (const [type, handler] of listeners) {
        document.removeEventListener(type, handler, true);
      }
      widget.remove();
    }
  };

  reflect();
  window.__retraceRecorder = instance;
  return instance;
})()
"##;
