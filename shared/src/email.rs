use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;
use std::env;

/// Send the welcome email for a manager-provisioned supervisor account.
/// Cognito delivers the temporary credentials separately; this mail tells
/// the supervisor where to sign in.
pub async fn send_welcome_email(
    ses_client: &SesClient,
    to_email: &str,
    full_name: &str,
    frontend_url: &str,
) -> Result<(), String> {
    let signin_link = format!("{}/auth", frontend_url);

    let html_body = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body {{
            font-family: 'HelveticaNeue', Helvetica, Arial, sans-serif;
            line-height: 1.6;
            color: #333333;
            background: #ffffff;
            margin: 0;
            padding: 0;
        }}
        .wrapper {{
            max-width: 600px;
            margin: 0 auto;
            padding: 60px 20px;
        }}
        .container {{
            background: #ffffff;
            border: 1px solid #e5e5e5;
            padding: 60px 50px;
        }}
        .logo {{
            font-size: 24px;
            font-weight: 300;
            color: #000000;
            margin: 0 0 40px 0;
            text-align: center;
            letter-spacing: -0.5px;
        }}
        .title {{
            font-size: 20px;
            font-weight: 300;
            color: #000000;
            margin: 0 0 24px 0;
        }}
        .text {{
            font-size: 15px;
            font-weight: 400;
            color: #333333;
            margin: 0 0 24px 0;
            line-height: 1.6;
        }}
        .button-wrapper {{
            text-align: center;
            margin: 32px 0;
        }}
        .button {{
            display: inline-block;
            width: 100%;
            max-width: 280px;
            padding: 18px 24px;
            background: #f59e0b;
            color: #ffffff;
            text-decoration: none;
            font-weight: 400;
            font-size: 15px;
            text-align: center;
            box-sizing: border-box;
        }}
        .footer {{
            margin-top: 40px;
            text-align: center;
        }}
        .footer-text {{
            font-size: 12px;
            color: #999999;
        }}
    </style>
</head>
<body>
    <div class="wrapper">
        <div class="container">
            <h1 class="logo">Sitestock</h1>

            <h2 class="title">Your supervisor account is ready</h2>

            <p class="text">
                Hi {}, a site manager has set up a supervisor account for you.
                A temporary password is on its way in a separate email. Sign in
                below to see your assigned site and its materials.
            </p>

            <div class="button-wrapper">
                <a href="{}" class="button">Sign In</a>
            </div>

            <p class="text" style="margin-top: 32px; font-size: 13px; color: #666666;">
                If you didn't expect this, you can safely ignore this email.
            </p>

            <div class="footer">
                <p class="footer-text">© 2025 Sitestock</p>
            </div>
        </div>
    </div>
</body>
</html>"#,
        full_name, signin_link
    );

    let text_body = format!(
        r#"Sitestock

Your supervisor account is ready

Hi {}, a site manager has set up a supervisor account for you. A temporary
password is on its way in a separate email. Sign in here to see your
assigned site and its materials:

{}

If you didn't expect this, you can safely ignore this email.

© 2025 Sitestock"#,
        full_name, signin_link
    );

    let destination = Destination::builder().to_addresses(to_email).build();

    let subject = Content::builder()
        .data("Your Sitestock supervisor account")
        .charset("UTF-8")
        .build()
        .map_err(|e| format!("Failed to build subject: {:?}", e))?;

    let html_content = Content::builder()
        .data(html_body)
        .charset("UTF-8")
        .build()
        .map_err(|e| format!("Failed to build HTML content: {:?}", e))?;

    let text_content = Content::builder()
        .data(text_body)
        .charset("UTF-8")
        .build()
        .map_err(|e| format!("Failed to build text content: {:?}", e))?;

    let body = Body::builder()
        .html(html_content)
        .text(text_content)
        .build();

    let message = Message::builder().subject(subject).body(body).build();

    let email_content = EmailContent::builder().simple(message).build();

    let from_address =
        env::var("SES_FROM_ADDRESS").unwrap_or_else(|_| "noreply@sitestock.app".to_string());

    ses_client
        .send_email()
        .from_email_address(from_address)
        .destination(destination)
        .content(email_content)
        .send()
        .await
        .map_err(|e| format!("Failed to send email: {:?}", e))?;

    Ok(())
}
