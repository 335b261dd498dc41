use axum::response::Html;

const INDEX_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Potato disease classifier</title>
  <style>
    body { font-family: sans-serif; max-width: 40rem; margin: 2rem auto; }
    img { max-width: 256px; display: block; margin: 1rem 0; }
    .bar { background: #4caf50; height: 1rem; }
    td { padding: 0.2rem 0.6rem; }
  </style>
</head>
<body>
  <h1>Potato disease classifier</h1>
  <p>Upload a potato leaf image (256x256 will be used).</p>
  <input id="file" type="file" accept="image/*">
  <img id="preview" alt="">
  <table id="result"></table>
  <script>
    const file = document.getElementById("file");
    file.addEventListener("change", async () => {
      const upload = file.files[0];
      if (!upload) return;
      document.getElementById("preview").src = URL.createObjectURL(upload);
      const table = document.getElementById("result");
      table.textContent = "Classifying...";
      const response = await fetch("/classify", {
        method: "POST",
        headers: { "Content-Type": upload.type || "application/octet-stream" },
        body: upload,
      });
      const body = await response.json();
      table.textContent = "";
      if (!response.ok) {
        table.textContent = body.error;
        return;
      }
      for (const entry of body.confidences) {
        const row = table.insertRow();
        row.insertCell().textContent = entry.label;
        const bar = document.createElement("div");
        bar.className = "bar";
        bar.style.width = (entry.confidence * 200) + "px";
        row.insertCell().appendChild(bar);
        row.insertCell().textContent = (entry.confidence * 100).toFixed(1) + "%";
      }
    });
  </script>
</body>
</html>
"#;

pub async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}
