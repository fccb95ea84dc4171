//! Vite + React + TypeScript + Tailwind starter every new project is cut from.
use super::FileSystemTree;

/// The file initial generation fills in.
pub const ENTRY_FILE: &str = "src/App.tsx";

const FILES: &[(&str, &str)] = &[
    (
        "package.json",
        r#"{
  "name": "vite-react-typescript-starter",
  "private": true,
  "version": "0.0.0",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "vite build",
    "preview": "vite preview"
  },
  "dependencies": {
    "react": "^18.3.1",
    "react-dom": "^18.3.1"
  },
  "devDependencies": {
    "@types/react": "^18.3.5",
    "@types/react-dom": "^18.3.0",
    "@vitejs/plugin-react": "^4.3.1",
    "autoprefixer": "^10.4.18",
    "postcss": "^8.4.35",
    "tailwindcss": "^3.4.1",
    "typescript": "^5.5.3",
    "vite": "^5.4.2"
  }
}
"#,
    ),
    (
        "vite.config.ts",
        r#"import { defineConfig } from 'vite';
import react from '@vitejs/plugin-react';

export default defineConfig({
  plugins: [react()],
  optimizeDeps: {},
});
"#,
    ),
    (
        "tsconfig.json",
        r#"{
  "compilerOptions": {
    "target": "ES2020",
    "useDefineForClassFields": true,
    "lib": ["ES2020", "DOM", "DOM.Iterable"],
    "module": "ESNext",
    "skipLibCheck": true,
    "moduleResolution": "bundler",
    "allowImportingTsExtensions": true,
    "isolatedModules": true,
    "noEmit": true,
    "jsx": "react-jsx",
    "strict": true
  },
  "include": ["src"]
}
"#,
    ),
    (
        "tailwind.config.js",
        r#"/** @type {import('tailwindcss').Config} */
export default {
  content: ['./index.html', './src/**/*.{js,ts,jsx,tsx}'],
  theme: {
    extend: {},
  },
  plugins: [],
};
"#,
    ),
    (
        "postcss.config.js",
        r#"export default {
  plugins: {
    tailwindcss: {},
    autoprefixer: {},
  },
};
"#,
    ),
    (
        "index.html",
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Vite + React + TS</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.tsx"></script>
  </body>
</html>
"#,
    ),
    (
        "src/main.tsx",
        r#"import { StrictMode } from 'react';
import { createRoot } from 'react-dom/client';
import App from './App.tsx';
import './index.css';

createRoot(document.getElementById('root')!).render(
  <StrictMode>
    <App />
  </StrictMode>
);
"#,
    ),
    (
        "src/index.css",
        "@tailwind base;\n@tailwind components;\n@tailwind utilities;\n",
    ),
    ("src/vite-env.d.ts", "/// <reference types=\"vite/client\" />\n"),
    (
        ENTRY_FILE,
        r#"import React from 'react';

function App() {
  return (
    <div></div>
  );
}
export default App;
"#,
    ),
];

/// A fresh copy of the starter project.
pub fn starter() -> FileSystemTree {
    let mut tree = FileSystemTree::new();
    for (path, contents) in FILES {
        // Paths above are static and non-conflicting.
        let _ = tree.write(path, *contents);
    }
    tree
}
