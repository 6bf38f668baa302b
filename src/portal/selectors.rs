//! CSS selectors for the portal, the exported artifact and the
//! documentation pages.

// Login: identifier page
pub const LOGIN_EMAIL: &str = "#email";
pub const LOGIN_MODE_SSO: &str = "#login-mode-sso";
pub const SSO_ENABLED_FLAG: &str = "#sso-enabled";
pub const SSO_ENABLED_VALUE: &str = "true";
pub const LOGIN_SUBMIT_IDENTIFIER: &str =
    "#login-form > div.form-group.form-submission > div:nth-child(1) > div:nth-child(1) > button";

// Login: identity provider
pub const LOGIN_USERNAME: &str = "#username";
pub const LOGIN_PASSWORD: &str = "#password";
pub const LOGIN_SUBMIT: &str = "#main-content > div.idp3_form-submit-container > button";
pub const TRUST_BROWSER_BUTTON: &str = "#trust-browser-button";

// Navigation
pub const SIDEBAR_REPORTS_TOGGLE: &str =
    "#left-sidebar > div > app-navigation > div > ul > li:nth-child(2) > button";
pub const REPORTS_LINK: &str = "#left-sidebar a[href$='/reports']";

// Report listing
pub const REPORT_ROWS: &str = "#reports-table > data-table > div > div tbody tr";
pub const REPORT_ENTITY_CELL: &str = ".column-entities";
pub const REPORT_FORMAT_CELL: &str = ".column-format";
pub const REPORT_SCAN_TYPE_LABELS: &str = ".ng-star-inserted";
pub const REPORT_DOWNLOAD_BUTTON: &str = "button:has(.fa-download)";
pub const REPORT_NEXT_PAGE: &str = "#reports-table .pagination-nextpage";

// Exported artifact
pub const ARTIFACT_ROWS: &str = ".section-body-table > table > tbody > tr";
pub const ARTIFACT_BASE_LINK: &str = "body > div > main > div:nth-child(2) > div:nth-child(4) > div:nth-child(3) > div > div > table > tbody > tr:nth-child(1) > th > a";
pub const ARTIFACT_ERROR_NAME: &str = "th > span > a";
pub const ARTIFACT_CATEGORY: &str = "td:nth-child(3)";
pub const ARTIFACT_INSTANCE_COUNT: &str = "td:nth-child(4)";
pub const ARTIFACT_DOCUMENTATION_LINK: &str = "td:nth-child(1) > a";

// Documentation page
pub const DOCUMENTATION_TEXT: &str = "#result-documentation-content p";
pub const DOCUMENTATION_WHY_IT_MATTERS: &str = "#result-documentation-content p:nth-child(2)";
pub const DOCUMENTATION_HOW_TO_FIX: &str = "#result-documentation-content p:nth-child(4)";

// Error detail listing
pub const DETAIL_VIEW_CONTROL: &str = ".table > tbody > tr > td:nth-child(7) > a";
pub const DETAIL_ROWS: &str = ".data-table .data-table-row-wrapper tr";
pub const DETAIL_URI_CELL: &str = ".column-uri";
pub const DETAIL_COUNT_CELL: &str = ".column-count";
pub const DETAIL_NEXT_PAGE: &str = ".pagination-nextpage";
