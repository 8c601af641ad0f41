//! Verification email templates (HTML + plain text).

/// Render the HTML version of the verification email
pub fn render_verification_html(name: &str, verify_url: &str, expires_in_hours: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Verify your email</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            margin: 0;
            padding: 0;
            background-color: #f5f5f5;
        }}
        .container {{
            max-width: 560px;
            margin: 0 auto;
            padding: 40px 20px;
        }}
        .card {{
            background-color: #ffffff;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0, 0, 0, 0.06);
            overflow: hidden;
        }}
        .header {{
            background: linear-gradient(135deg, #8b5cf6 0%, #6d28d9 100%);
            color: white;
            padding: 32px 24px;
            text-align: center;
        }}
        .header h1 {{
            margin: 0;
            font-size: 24px;
            font-weight: 600;
        }}
        .content {{
            padding: 32px 24px;
        }}
        .content p {{
            margin: 0 0 16px;
            color: #374151;
            line-height: 1.6;
        }}
        .button-container {{
            text-align: center;
            margin: 32px 0;
        }}
        .button {{
            display: inline-block;
            background: linear-gradient(135deg, #8b5cf6 0%, #6d28d9 100%);
            color: white !important;
            text-decoration: none;
            padding: 14px 32px;
            border-radius: 6px;
            font-weight: 500;
            font-size: 16px;
        }}
        .note {{
            color: #6b7280;
            font-size: 13px;
            text-align: center;
            margin-top: 24px;
        }}
        .footer {{
            padding: 24px;
            text-align: center;
            color: #9ca3af;
            font-size: 12px;
            border-top: 1px solid #f3f4f6;
        }}
    </style>
</head>
<body>
    <div class="container">
        <div class="card">
            <div class="header">
                <h1>Verify your email</h1>
            </div>
            <div class="content">
                <p>Hi {name},</p>
                <p>Thanks for signing up for Inboxr. Confirm your email address to activate your account.</p>

                <div class="button-container">
                    <a href="{verify_url}" class="button">Verify Email</a>
                </div>

                <p class="note">This link will expire in {expires_in_hours} hours. If you didn't create an account, you can safely ignore this email.</p>
            </div>
            <div class="footer">
                <p>Sent by Inboxr - One inbox for your whole team</p>
            </div>
        </div>
    </div>
</body>
</html>"#,
        name = html_escape(name),
        verify_url = verify_url,
        expires_in_hours = expires_in_hours,
    )
}

/// Render the plain text version of the verification email
pub fn render_verification_text(name: &str, verify_url: &str, expires_in_hours: i64) -> String {
    format!(
        r#"Verify your email

Hi {name},

Thanks for signing up for Inboxr. Confirm your email address to activate your account by visiting:

{verify_url}

This link will expire in {expires_in_hours} hours.

If you didn't create an account, you can safely ignore this email.

---
Sent by Inboxr - One inbox for your whole team"#,
        name = name,
        verify_url = verify_url,
        expires_in_hours = expires_in_hours,
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
