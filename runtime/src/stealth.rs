//! Browser fingerprint evasion.
//!
//! Scripts installed with `Page.addScriptToEvaluateOnNewDocument` so they run
//! before any page script. Each one patches a single signal that bot
//! detectors commonly read off a headless Chromium session.

/// Launch flags that remove automation hints at the browser level.
pub const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--lang=en-US,en",
];

const HIDE_WEBDRIVER: &str = r#"
Object.defineProperty(Navigator.prototype, 'webdriver', {
  get: () => undefined,
  configurable: true,
});
"#;

const LANGUAGES: &str = r#"
Object.defineProperty(Navigator.prototype, 'languages', {
  get: () => ['en-US', 'en'],
  configurable: true,
});
"#;

const PLUGINS: &str = r#"
(() => {
  const pdf = (name) => ({
    name,
    filename: 'internal-pdf-viewer',
    description: 'Portable Document Format',
  });
  const fake = [pdf('PDF Viewer'), pdf('Chrome PDF Viewer'), pdf('Chromium PDF Viewer')];
  Object.assign(fake, {
    item: (i) => fake[i],
    namedItem: (n) => fake.find((p) => p.name === n),
  });
  Object.defineProperty(Navigator.prototype, 'plugins', {
    get: () => fake,
    configurable: true,
  });
})();
"#;

const CHROME_RUNTIME: &str = r#"
if (!window.chrome) {
  Object.defineProperty(window, 'chrome', {
    value: { runtime: {}, app: { isInstalled: false }, csi: () => {}, loadTimes: () => {} },
    configurable: true,
    writable: true,
  });
}
"#;

const PERMISSIONS: &str = r#"
(() => {
  const permissions = window.navigator.permissions;
  if (!permissions || !permissions.query) return;
  const original = permissions.query.bind(permissions);
  permissions.query = (params) =>
    params && params.name === 'notifications'
      ? Promise.resolve({ state: Notification.permission, onchange: null })
      : original(params);
})();
"#;

const WEBGL_VENDOR: &str = r#"
(() => {
  const patch = (proto) => {
    if (!proto) return;
    const getParameter = proto.getParameter;
    proto.getParameter = function (p) {
      if (p === 37445) return 'Intel Inc.';
      if (p === 37446) return 'Intel Iris OpenGL Engine';
      return getParameter.call(this, p);
    };
  };
  patch(window.WebGLRenderingContext && WebGLRenderingContext.prototype);
  patch(window.WebGL2RenderingContext && WebGL2RenderingContext.prototype);
})();
"#;

const HARDWARE: &str = r#"
for (const key of ['hardwareConcurrency', 'deviceMemory']) {
  Object.defineProperty(Navigator.prototype, key, { get: () => 8, configurable: true });
}
"#;

/// All evasion scripts, in install order.
pub fn init_scripts() -> &'static [&'static str] {
    &[
        HIDE_WEBDRIVER,
        LANGUAGES,
        PLUGINS,
        CHROME_RUNTIME,
        PERMISSIONS,
        WEBGL_VENDOR,
        HARDWARE,
    ]
}

/// Strip the `HeadlessChrome` token some user agents carry.
pub fn sanitize_user_agent(ua: &str) -> String {
    ua.replace("HeadlessChrome", "Chrome")
}
