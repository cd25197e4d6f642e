mod common;

use common::MockBrowser;
use rpa_engine::{BrowserLauncher, BrowserOptions, BrowserSession, FlowEngineError};
use std::time::Duration;

async fn session(browser: &MockBrowser) -> BrowserSession {
    let driver = browser.launch(&BrowserOptions::default()).await.unwrap();
    BrowserSession::new(driver)
}

#[tokio::test]
async fn test_no_active_page() {
    let browser = MockBrowser::new();
    let session = session(&browser).await;

    assert!(matches!(session.page(), Err(FlowEngineError::NoActivePage)));
    assert!(matches!(
        session.click("#a").await,
        Err(FlowEngineError::NoActivePage)
    ));
    assert_eq!(session.current_name(), None);
}

#[tokio::test]
async fn test_use_unknown_page() {
    let browser = MockBrowser::new();
    let mut session = session(&browser).await;
    session.open_page("main").await.unwrap();

    let err = session.use_page("reports").unwrap_err();
    assert!(matches!(err, FlowEngineError::PageNotFound { ref name } if name == "reports"));
    // The current page is left alone
    assert_eq!(session.current_name(), Some("main"));
}

#[tokio::test]
async fn test_pages_are_addressed_by_name() {
    let browser = MockBrowser::new().with_element("#ok");
    let mut session = session(&browser).await;

    let main = session.open_page("main").await.unwrap();
    let popup = session.open_page("popup").await.unwrap();
    assert_ne!(main, popup);
    assert_eq!(session.page_count(), 2);

    assert_eq!(session.use_page("main").unwrap(), main);
    assert_eq!(session.open_page("popup").await.unwrap(), popup);
    assert_eq!(browser.pages_opened(), 2);

    session
        .wait_for_selector("#ok", Duration::from_millis(10))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let browser = MockBrowser::new();
    let mut session = session(&browser).await;
    session.open_page("main").await.unwrap();

    session.close().await.unwrap();
    session.close().await.unwrap();

    assert!(session.is_closed());
    assert_eq!(session.page_count(), 0);
    assert_eq!(browser.closes(), 1);
    assert!(matches!(
        session.open_page("main").await,
        Err(FlowEngineError::BrowserLaunch(_))
    ));
}
